//! Global queue of outgoing entity messages.

use std::collections::VecDeque;

use crate::entity::EntityMessage;
use crate::registry::EntityRegistry;

/// FIFO of entity messages waiting for the network layer.
///
/// Messages are appended entity by entity in registry order; there is no
/// ordering across entities beyond that.
#[derive(Debug, Default)]
pub struct MessageOutbox {
    queue: VecDeque<EntityMessage>,
}

impl MessageOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every entity's pending messages. Returns how many were moved.
    pub fn collect_from(&mut self, registry: &mut EntityRegistry) -> usize {
        let before = self.queue.len();
        for entity in registry.iter_mut() {
            self.queue.extend(entity.base.take_messages());
        }
        self.queue.len() - before
    }

    pub fn push(&mut self, message: EntityMessage) {
        self.queue.push_back(message);
    }

    pub fn pop(&mut self) -> Option<EntityMessage> {
        self.queue.pop_front()
    }

    /// Take everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<EntityMessage> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityMessage> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityCommand, ServerEntity};
    use crate::storage::MemoryBlockStore;
    use glam::Vec3;
    use voxsim_core::InventoryItem;

    #[test]
    fn collects_in_id_order_and_empties_entities() {
        let mut map = MemoryBlockStore::flat(4, 0);
        let mut registry = EntityRegistry::new();
        let a = registry
            .add(ServerEntity::item(Vec3::ZERO, InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();
        let b = registry
            .add(ServerEntity::item(Vec3::ZERO, InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();

        let second = registry.get_mut(b).unwrap();
        second.base.send(EntityCommand::Damage { amount: 1 }, false);
        let first = registry.get_mut(a).unwrap();
        first.base.send(EntityCommand::Damage { amount: 2 }, true);
        first.base.send(EntityCommand::Damage { amount: 3 }, false);

        let mut outbox = MessageOutbox::new();
        assert_eq!(outbox.collect_from(&mut registry), 3);
        let ids: Vec<_> = outbox.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a, a, b]);
        assert_eq!(outbox.collect_from(&mut registry), 0);

        let first = outbox.pop().unwrap();
        assert!(first.reliable);
        assert_eq!(outbox.drain().len(), 2);
        assert!(outbox.is_empty());
    }
}
