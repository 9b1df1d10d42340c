//! Mailbox and visibility router.
//!
//! Routing is split in two: [`Mailbox::route`] computes who receives a
//! message without touching any memory, and [`Mailbox::deliver`] appends the
//! result. Authority-class participants receive every message, public or
//! direct. Each memory is a ring of the most recent `capacity` entries;
//! older entries fall off the front.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use parley_types::{CapabilityRole, MemoryEntry, Message, Recipients};

/// Where one message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The message with its recipients normalized.
    pub message: Message,
    /// Participants whose memory receives the entry, in name order.
    pub audience: Vec<String>,
}

impl Delivery {
    /// Whether the normalized message is addressed to a subset.
    pub const fn is_direct(&self) -> bool {
        !self.message.recipients.is_broadcast()
    }

    /// The memory line every recipient stores.
    pub fn entry(&self) -> MemoryEntry {
        MemoryEntry {
            turn: self.message.turn,
            sender: self.message.sender.clone(),
            to: self.message.recipients.label(),
            text: self.message.text.clone(),
        }
    }
}

/// Per-participant bounded memory plus the routing rules.
#[derive(Debug, Clone)]
pub struct Mailbox {
    capacity: usize,
    logs: BTreeMap<String, VecDeque<MemoryEntry>>,
    authorities: BTreeSet<String>,
}

impl Mailbox {
    /// A mailbox keeping `capacity` entries per participant.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            logs: BTreeMap::new(),
            authorities: BTreeSet::new(),
        }
    }

    /// Give `name` a memory log.
    pub fn register(&mut self, name: &str, capability: CapabilityRole) {
        self.logs.entry(name.to_owned()).or_default();
        if capability.is_authority() {
            self.authorities.insert(name.to_owned());
        }
    }

    /// Collapse a named set equal to the living roster into a broadcast.
    ///
    /// Authority names are ignored for the comparison, since they see
    /// everything anyway.
    pub fn normalize(&self, recipients: &Recipients, living: &[String]) -> Recipients {
        match recipients {
            Recipients::All => Recipients::All,
            Recipients::Named(names) => {
                let players: BTreeSet<&str> = names
                    .iter()
                    .map(String::as_str)
                    .filter(|n| !self.authorities.contains(*n))
                    .collect();
                let roster: BTreeSet<&str> = living.iter().map(String::as_str).collect();
                if !roster.is_empty() && players == roster {
                    Recipients::All
                } else {
                    recipients.clone()
                }
            }
        }
    }

    /// Compute the audience of `message` without delivering it.
    pub fn route(&self, message: &Message, living: &[String]) -> Delivery {
        let recipients = self.normalize(&message.recipients, living);
        let mut audience: BTreeSet<String> = self.authorities.clone();
        match &recipients {
            Recipients::All => {
                audience.extend(living.iter().filter(|n| self.logs.contains_key(*n)).cloned());
            }
            Recipients::Named(names) => {
                audience.insert(message.sender.clone());
                audience.extend(names.iter().filter(|n| self.logs.contains_key(*n)).cloned());
            }
        }
        audience.retain(|n| self.logs.contains_key(n));

        Delivery {
            message: Message {
                recipients,
                ..message.clone()
            },
            audience: audience.into_iter().collect(),
        }
    }

    /// Append a routed message to every memory in its audience.
    pub fn deliver(&mut self, delivery: &Delivery) {
        let entry = delivery.entry();
        for name in &delivery.audience {
            if let Some(log) = self.logs.get_mut(name) {
                if log.len() >= self.capacity {
                    log.pop_front();
                }
                log.push_back(entry.clone());
            }
        }
    }

    /// Route and deliver in one step.
    pub fn post(&mut self, message: &Message, living: &[String]) -> Delivery {
        let delivery = self.route(message, living);
        self.deliver(&delivery);
        delivery
    }

    /// The memory of `name`, oldest first.
    pub fn memory(&self, name: &str) -> Vec<MemoryEntry> {
        self.logs
            .get(name)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_types::{GM_NAME, SYSTEM_NAME};

    use super::*;

    fn roster() -> Vec<String> {
        vec!["P1".into(), "P2".into(), "P3".into()]
    }

    fn mailbox(capacity: usize) -> Mailbox {
        let mut mb = Mailbox::new(capacity);
        for p in roster() {
            mb.register(&p, CapabilityRole::Player);
        }
        mb.register(GM_NAME, CapabilityRole::AuthorityGm);
        mb.register(SYSTEM_NAME, CapabilityRole::AuthoritySystem);
        mb
    }

    fn msg(turn: u64, sender: &str, to: &str) -> Message {
        Message {
            turn,
            sender: sender.into(),
            recipients: Recipients::parse(to),
            text: format!("hello from {sender}"),
        }
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let mut mb = mailbox(10);
        let delivery = mb.post(&msg(1, "P1", "ALL"), &roster());
        assert!(!delivery.is_direct());
        for name in ["P1", "P2", "P3", GM_NAME, SYSTEM_NAME] {
            assert_eq!(mb.memory(name).len(), 1, "{name} should see the broadcast");
        }
    }

    #[test]
    fn direct_reaches_sender_recipients_and_authorities() {
        let mut mb = mailbox(10);
        mb.post(&msg(1, "P1", "P2"), &roster());
        assert_eq!(mb.memory("P1").len(), 1);
        assert_eq!(mb.memory("P2").len(), 1);
        assert!(mb.memory("P3").is_empty());
        assert_eq!(mb.memory(GM_NAME).len(), 1);
        assert_eq!(mb.memory(SYSTEM_NAME).len(), 1);
        assert_eq!(mb.memory("P2").first().unwrap().to, "P2");
    }

    #[test]
    fn full_roster_collapses_to_broadcast() {
        let mb = mailbox(10);
        let delivery = mb.route(&msg(1, "P1", "P3,P2,P1"), &roster());
        assert_eq!(delivery.message.recipients, Recipients::All);

        let with_gm = mb.route(&msg(1, "P1", "P1,P2,P3,GM"), &roster());
        assert_eq!(with_gm.message.recipients, Recipients::All);

        let partial = mb.route(&msg(1, "P1", "P1,P2"), &roster());
        assert!(partial.is_direct());
    }

    #[test]
    fn dead_players_miss_broadcasts() {
        let mut mb = mailbox(10);
        let living = vec!["P1".to_owned(), "P2".to_owned()];
        mb.post(&msg(1, "P1", "ALL"), &living);
        assert!(mb.memory("P3").is_empty());
        assert_eq!(mb.memory(GM_NAME).len(), 1);
    }

    #[test]
    fn memory_is_bounded() {
        let mut mb = mailbox(2);
        for turn in 1..=5 {
            mb.post(&msg(turn, "P1", "ALL"), &roster());
        }
        let turns: Vec<u64> = mb.memory("P2").iter().map(|e| e.turn).collect();
        assert_eq!(turns, vec![4, 5]);
    }
}
