//! Snapshot collections for read-mostly routing tables
//!
//! Both collections keep an immutable snapshot behind an `Arc`. Readers clone
//! the `Arc` and then work on a snapshot nobody will ever modify. Writers are
//! serialized, build a full copy with their change applied and swap it in.
//! The swap lock is only ever held for an `Arc` clone or assignment, never
//! while a copy is being built or a snapshot is being iterated.

use parking_lot::{Mutex, RwLock};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Copy-on-write hash map
pub struct CopyOnWriteMap<K, V> {
    current: RwLock<Arc<HashMap<K, V>>>,
    writer: Mutex<()>,
}

impl<K, V> CopyOnWriteMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    pub fn from_map(map: HashMap<K, V>) -> Self {
        Self {
            current: RwLock::new(Arc::new(map)),
            writer: Mutex::new(()),
        }
    }

    /// The current immutable snapshot
    pub fn snapshot(&self) -> Arc<HashMap<K, V>> {
        self.current.read().clone()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.snapshot().get(key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.snapshot().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Insert, returning the value previously stored under `key`
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let _guard = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        let previous = next.insert(key, value);
        *self.current.write() = Arc::new(next);
        previous
    }

    /// Copy every entry of `other` in, in a single swap
    pub fn merge(&self, other: impl IntoIterator<Item = (K, V)>) {
        let _guard = self.writer.lock();
        let mut next = (*self.snapshot()).clone();
        next.extend(other);
        *self.current.write() = Arc::new(next);
    }

    /// Remove `key`. No new snapshot is published when it is absent.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _guard = self.writer.lock();
        let current = self.snapshot();
        if !current.contains_key(key) {
            return None;
        }
        let mut next = (*current).clone();
        let removed = next.remove(key);
        *self.current.write() = Arc::new(next);
        removed
    }

    pub fn clear(&self) {
        let _guard = self.writer.lock();
        *self.current.write() = Arc::new(HashMap::new());
    }
}

impl<K, V> Default for CopyOnWriteMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

struct Node<T> {
    value: T,
    next: Option<Arc<Node<T>>>,
}

/// Immutable singly linked list, the snapshot type of [`CopyOnWriteList`]
pub struct LinkedSnapshot<T> {
    head: Option<Arc<Node<T>>>,
    len: usize,
}

impl<T> LinkedSnapshot<T> {
    fn from_vec(values: Vec<T>) -> Self {
        let len = values.len();
        let mut head = None;
        for value in values.into_iter().rev() {
            head = Some(Arc::new(Node { value, next: head }));
        }
        Self { head, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.as_deref(),
        }
    }
}

impl<'a, T> IntoIterator for &'a LinkedSnapshot<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> Drop for LinkedSnapshot<T> {
    // unlink iteratively so long lists do not recurse on drop
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(node) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mut node) => node.next.take(),
                Err(_) => None,
            };
        }
    }
}

/// Iterator over a [`LinkedSnapshot`]
pub struct Iter<'a, T> {
    next: Option<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| {
            self.next = node.next.as_deref();
            &node.value
        })
    }
}

/// Copy-on-write, insertion ordered linked list
pub struct CopyOnWriteList<T> {
    current: RwLock<Arc<LinkedSnapshot<T>>>,
    writer: Mutex<()>,
}

impl<T: Clone> CopyOnWriteList<T> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(LinkedSnapshot::from_vec(Vec::new()))),
            writer: Mutex::new(()),
        }
    }

    /// The current immutable snapshot, unaffected by later writes
    pub fn snapshot(&self) -> Arc<LinkedSnapshot<T>> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// First element accepted by `predicate`
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        self.snapshot().iter().find(|v| predicate(v)).cloned()
    }

    fn publish(&self, values: Vec<T>) {
        *self.current.write() = Arc::new(LinkedSnapshot::from_vec(values));
    }

    /// Replace the first element matching `same` in place, or append.
    ///
    /// Returns the replaced element.
    pub fn add_or_replace(&self, value: T, same: impl Fn(&T) -> bool) -> Option<T> {
        let _guard = self.writer.lock();
        let mut values: Vec<T> = self.snapshot().iter().cloned().collect();
        let replaced = match values.iter_mut().find(|v| same(v)) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                values.push(value);
                None
            }
        };
        self.publish(values);
        replaced
    }

    /// Remove the first element matching `predicate`
    pub fn remove(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let _guard = self.writer.lock();
        let mut values: Vec<T> = self.snapshot().iter().cloned().collect();
        let index = values.iter().position(|v| predicate(v))?;
        let removed = values.remove(index);
        self.publish(values);
        Some(removed)
    }

    pub fn clear(&self) {
        let _guard = self.writer.lock();
        self.publish(Vec::new());
    }
}

impl<T: Clone> Default for CopyOnWriteList<T> {
    fn default() -> Self {
        Self::new()
    }
}
