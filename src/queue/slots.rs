//! Id-keyed mutation of an ordered collection.
//!
//! Both the pending queue and the finished history are plain ordered vectors
//! that hold at most one entry per task id. These helpers keep that invariant:
//! an existing entry is overwritten in its slot, a new one goes to the end.

use super::models::{Keyed, TaskId};

/// Where an upserted item landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Replaced(usize),
    Appended(usize),
}

pub fn position<T: Keyed>(items: &[T], id: &TaskId) -> Option<usize> {
    items.iter().position(|item| item.key() == id)
}

/// Replace the entry with the same id in place, or append.
pub fn upsert<T: Keyed>(items: &mut Vec<T>, item: T) -> Upsert {
    match position(items, item.key()) {
        Some(index) => {
            items[index] = item;
            Upsert::Replaced(index)
        }
        None => {
            items.push(item);
            Upsert::Appended(items.len() - 1)
        }
    }
}

/// Remove the first entry with `id`, shifting later entries forward.
pub fn remove<T: Keyed>(items: &mut Vec<T>, id: &TaskId) -> Option<T> {
    position(items, id).map(|index| items.remove(index))
}
