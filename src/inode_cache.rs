//! Inode-to-leaf cache: memoises the leaf-node logical address where a
//! given inode's items were last found, so a multi-component path lookup
//! doesn't re-descend the filesystem tree from the root for every
//! component.
//!
//! Direct-mapped by `inode % table_size`, two parallel arrays rather than
//! an array of pairs. spec.md flags a two-lines-write-the-same-array bug
//! in the source this is modelled on (`key[slot] = inode` written twice,
//! `addr[slot]` never touched) — kept in mind here, not reproduced.

pub struct InodeCache {
    keys: Vec<Option<u64>>,
    addrs: Vec<u64>,
}

impl InodeCache {
    pub fn new(table_size: usize) -> Self {
        let table_size = table_size.max(1);
        InodeCache {
            keys: vec![None; table_size],
            addrs: vec![0; table_size],
        }
    }

    fn slot(&self, inode: u64) -> usize {
        (inode % self.keys.len() as u64) as usize
    }

    /// Returns the cached leaf address for `inode`, if the slot it maps to
    /// still holds that inode (direct-mapped: a later insert of a
    /// different inode evicts it).
    pub fn get(&self, inode: u64) -> Option<u64> {
        let slot = self.slot(inode);
        if self.keys[slot] == Some(inode) {
            Some(self.addrs[slot])
        } else {
            None
        }
    }

    /// Records that `inode`'s items live in the leaf at `leaf_addr`,
    /// evicting whatever previously occupied that slot.
    pub fn insert(&mut self, inode: u64, leaf_addr: u64) {
        let slot = self.slot(inode);
        self.keys[slot] = Some(inode);
        self.addrs[slot] = leaf_addr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_hit() {
        let mut cache = InodeCache::new(16);
        cache.insert(256, 0x4000);
        assert_eq!(cache.get(256), Some(0x4000));
    }

    #[test]
    fn miss_on_empty_slot() {
        let cache = InodeCache::new(16);
        assert_eq!(cache.get(5), None);
    }

    #[test]
    fn colliding_inode_evicts_previous_occupant() {
        let mut cache = InodeCache::new(16);
        cache.insert(5, 0x1000);
        cache.insert(21, 0x2000); // 21 % 16 == 5 % 16
        assert_eq!(cache.get(5), None);
        assert_eq!(cache.get(21), Some(0x2000));
    }
}
