use crate::{
    config::Config,
    executor::node::TaskNode,
    sync::{Arc, Mutex, lock},
    task::Task,
    types::{HashMap, TaskKey},
};
use core::hash::BuildHasher;
use rustc_hash::FxBuildHasher;

/// Executor-scoped memo table mapping task keys to their nodes.
///
/// Split into independently locked shards so that workers interning
/// unrelated tasks do not contend on one lock.
pub(crate) struct Registry<C: Config> {
    shards: Box<[Mutex<HashMap<TaskKey<C>, Arc<TaskNode<C>>>>]>,
}

impl<C: Config> Registry<C> {
    pub(crate) fn new(parallelism: usize) -> Self {
        let num_shards = parallelism.saturating_mul(4).next_power_of_two();
        Self {
            shards: (0..num_shards)
                .map(|_| Mutex::new(HashMap::default()))
                .collect(),
        }
    }

    fn shard(&self, key: &TaskKey<C>) -> &Mutex<HashMap<TaskKey<C>, Arc<TaskNode<C>>>> {
        // Truncation is fine: only the low bits pick the shard.
        #[allow(clippy::cast_possible_truncation)]
        let hash = FxBuildHasher.hash_one(key) as usize;
        &self.shards[hash & (self.shards.len() - 1)]
    }

    /// Node for `task`'s key, creating it from `task` if the key is new.
    ///
    /// Returns the node and whether it was created by this call.
    pub(crate) fn intern(&self, task: C::Task) -> (Arc<TaskNode<C>>, bool) {
        let key = task.key();
        let node_key = key.clone();
        let mut shard = lock(self.shard(&key));
        if let Some(node) = shard.get(&key) {
            return (Arc::clone(node), false);
        }
        let node = Arc::new(TaskNode::new(node_key, task));
        shard.insert(key, Arc::clone(&node));
        (node, true)
    }

    pub(crate) fn get(&self, key: &TaskKey<C>) -> Option<Arc<TaskNode<C>>> {
        lock(self.shard(key)).get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| lock(shard).len()).sum()
    }
}

impl<C: Config> Drop for Registry<C> {
    fn drop(&mut self) {
        // Break dependency edges so nodes in unfinished or cyclic graphs are
        // freed together with the table.
        for shard in &*self.shards {
            for node in lock(shard).values() {
                node.release_deps();
            }
        }
    }
}
