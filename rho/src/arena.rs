//! Fixed-size-cell arena with mark/sweep collection.
//!
//! Every size class has its own pool. A pool is a list of superblocks, each
//! carved into `superblock_size / cell_size` cells, with free cells threaded
//! onto a singly-linked free list. When a pool runs dry the out-of-cells hook
//! (a full collection) runs once; if that reclaims nothing for the pool a new
//! superblock is appended.

use crate::{HeapObject, ObjectRef, SizeClass, Visitable};

/// Consumers implement this to supply the root set at collection time.
pub trait RootProvider {
    fn visit_roots(&self, visitor: &mut dyn FnMut(ObjectRef));
}

impl RootProvider for [ObjectRef] {
    fn visit_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.iter().for_each(|&r| visitor(r));
    }
}

impl RootProvider for Vec<ObjectRef> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.as_slice().visit_roots(visitor);
    }
}

#[derive(Debug, Clone)]
pub struct ArenaSettings {
    /// Cell size of every pool in bytes, strictly ascending.
    pub cell_sizes: Vec<usize>,
    /// Size of a superblock in bytes. Must hold at least one cell of every
    /// class.
    pub superblock_size: usize,
    /// Upper bound of superblocks per pool; exceeding it is fatal.
    pub max_superblocks: Option<usize>,
    /// Collect before every allocation. Slow, shakes out rooting bugs.
    pub torture: bool,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            cell_sizes: vec![32, 64, 128, 256],
            superblock_size: 65_536,
            max_superblocks: None,
            torture: false,
        }
    }
}

impl ArenaSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.cell_sizes.is_empty() {
            return Err("at least one size class is required");
        }
        if self.cell_sizes.len() > u8::MAX as usize {
            return Err("too many size classes");
        }
        if self.cell_sizes.contains(&0) || self.superblock_size == 0 {
            return Err("sizes must be > 0");
        }
        if !self.cell_sizes.windows(2).all(|w| w[0] < w[1]) {
            return Err("cell sizes must be strictly ascending");
        }
        if self.cell_sizes.iter().any(|&size| size > self.superblock_size) {
            return Err("superblock_size must hold at least one cell");
        }
        if self.max_superblocks == Some(0) {
            return Err("max_superblocks must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GarbageCollectionStats {
    pub collections: u64,
    pub last_reclaimed: usize,
    pub total_reclaimed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "pool {class}: {allocated} allocated + {free} free != {total} cells"
)]
pub struct ArenaInconsistency {
    pub class: u8,
    pub allocated: usize,
    pub free: usize,
    pub total: usize,
}

#[derive(Debug)]
enum CellState {
    Free { next: Option<u32> },
    Live { object: HeapObject, marked: bool },
}

#[derive(Debug)]
struct Cell {
    generation: u32,
    state: CellState,
}

#[derive(Debug)]
struct Pool {
    class: SizeClass,
    cell_size: usize,
    cells_per_superblock: usize,
    superblocks: Vec<Box<[Cell]>>,
    free_head: Option<u32>,
    free_cells: usize,
    allocated_cells: usize,
}

#[derive(Debug)]
pub struct Arena {
    settings: ArenaSettings,
    pools: Vec<Pool>,
    stats: GarbageCollectionStats,
}

impl Pool {
    fn new(class: SizeClass, cell_size: usize, superblock_size: usize) -> Self {
        Self {
            class,
            cell_size,
            cells_per_superblock: superblock_size / cell_size,
            superblocks: Vec::new(),
            free_head: None,
            free_cells: 0,
            allocated_cells: 0,
        }
    }

    #[inline]
    fn total_cells(&self) -> usize {
        self.cells_per_superblock * self.superblocks.len()
    }

    #[inline]
    fn locate(&self, index: u32) -> (usize, usize) {
        let index = index as usize;
        (
            index / self.cells_per_superblock,
            index % self.cells_per_superblock,
        )
    }

    fn cell(&self, index: u32) -> Option<&Cell> {
        let (block, offset) = self.locate(index);
        self.superblocks.get(block).map(|cells| &cells[offset])
    }

    fn cell_mut(&mut self, index: u32) -> Option<&mut Cell> {
        let (block, offset) = self.locate(index);
        self.superblocks.get_mut(block).map(|cells| &mut cells[offset])
    }

    fn grow(&mut self, max_superblocks: Option<usize>) {
        if let Some(max) = max_superblocks {
            if self.superblocks.len() >= max {
                panic!(
                    "out of memory: pool {} exhausted {max} superblocks",
                    self.class.0
                );
            }
        }

        let cps = self.cells_per_superblock;
        let base = self.total_cells();
        assert!(
            base + cps <= u32::MAX as usize,
            "pool {} exceeds addressable cells",
            self.class.0
        );

        let cells = (0..cps)
            .map(|offset| {
                let next = if offset + 1 < cps {
                    Some((base + offset + 1) as u32)
                } else {
                    self.free_head
                };
                Cell {
                    generation: 0,
                    state: CellState::Free { next },
                }
            })
            .collect::<Vec<_>>();

        self.superblocks.push(cells.into_boxed_slice());
        self.free_head = Some(base as u32);
        self.free_cells += cps;

        log::debug!(
            "arena: pool {} ({} byte cells) grew to {} superblocks",
            self.class.0,
            self.cell_size,
            self.superblocks.len()
        );
    }

    fn take_free(&mut self, object: HeapObject) -> ObjectRef {
        let index = self.free_head.expect("free list must not be empty");
        let (block, offset) = self.locate(index);
        let cell = &mut self.superblocks[block][offset];
        let next = match cell.state {
            CellState::Free { next } => next,
            CellState::Live { .. } => {
                panic!("free list of pool {} points at a live cell", self.class.0)
            }
        };
        cell.state = CellState::Live {
            object,
            marked: false,
        };
        let generation = cell.generation;
        self.free_head = next;
        self.free_cells -= 1;
        self.allocated_cells += 1;
        ObjectRef::from_parts(self.class, index, generation)
    }

    fn sweep(&mut self) -> usize {
        let Pool {
            superblocks,
            free_head,
            free_cells,
            allocated_cells,
            cells_per_superblock,
            ..
        } = self;

        let mut reclaimed = 0;
        for (block_idx, cells) in superblocks.iter_mut().enumerate() {
            for (offset, cell) in cells.iter_mut().enumerate() {
                let CellState::Live { marked, .. } = &mut cell.state else {
                    continue;
                };
                if *marked {
                    *marked = false;
                    continue;
                }
                let index = (block_idx * *cells_per_superblock + offset) as u32;
                cell.state = CellState::Free { next: *free_head };
                cell.generation = ObjectRef::next_generation(cell.generation);
                *free_head = Some(index);
                reclaimed += 1;
            }
        }
        *free_cells += reclaimed;
        *allocated_cells -= reclaimed;
        reclaimed
    }

    fn verify(&self) -> Result<(), ArenaInconsistency> {
        let inconsistency = || ArenaInconsistency {
            class: self.class.0,
            allocated: self.allocated_cells,
            free: self.free_cells,
            total: self.total_cells(),
        };

        if self.allocated_cells + self.free_cells != self.total_cells() {
            return Err(inconsistency());
        }

        let live = self
            .superblocks
            .iter()
            .flat_map(|cells| cells.iter())
            .filter(|cell| matches!(cell.state, CellState::Live { .. }))
            .count();
        if live != self.allocated_cells {
            return Err(inconsistency());
        }

        let mut listed = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            listed += 1;
            if listed > self.free_cells {
                return Err(inconsistency());
            }
            cursor = match self.cell(index).map(|cell| &cell.state) {
                Some(CellState::Free { next }) => *next,
                _ => return Err(inconsistency()),
            };
        }
        if listed != self.free_cells {
            return Err(inconsistency());
        }
        Ok(())
    }
}

impl Arena {
    pub fn new(settings: ArenaSettings) -> Result<Self, &'static str> {
        settings.validate()?;
        let pools = settings
            .cell_sizes
            .iter()
            .enumerate()
            .map(|(idx, &size)| {
                Pool::new(SizeClass(idx as u8), size, settings.superblock_size)
            })
            .collect();
        Ok(Self {
            settings,
            pools,
            stats: GarbageCollectionStats::default(),
        })
    }

    pub fn settings(&self) -> &ArenaSettings {
        &self.settings
    }

    pub fn size_class_for(&self, bytes: usize) -> SizeClass {
        let idx = self
            .pools
            .iter()
            .position(|pool| pool.cell_size >= bytes)
            .unwrap_or(self.pools.len() - 1);
        SizeClass(idx as u8)
    }

    /// Allocates a cell for `object`, picking the size class from its size.
    pub fn allocate(
        &mut self,
        object: HeapObject,
        roots: &dyn RootProvider,
    ) -> ObjectRef {
        let class = self.size_class_for(object.estimated_size());
        self.allocate_in(class, object, roots)
    }

    /// Allocates a cell of the given class.
    ///
    /// An empty free list runs the collection hook exactly once; the pool
    /// grows only if the hook left it empty. The object being allocated is
    /// part of the root set during that collection.
    pub fn allocate_in(
        &mut self,
        class: SizeClass,
        object: HeapObject,
        roots: &dyn RootProvider,
    ) -> ObjectRef {
        let idx = class.0 as usize;
        assert!(idx < self.pools.len(), "unknown size class {}", class.0);

        if self.settings.torture || self.pools[idx].free_head.is_none() {
            self.collect_with(roots, Some(&object));
            if self.pools[idx].free_head.is_none() {
                self.pools[idx].grow(self.settings.max_superblocks);
            }
        }
        self.pools[idx].take_free(object)
    }

    /// Runs a full collection and returns the number of reclaimed cells.
    pub fn collect(&mut self, roots: &dyn RootProvider) -> usize {
        self.collect_with(roots, None)
    }

    fn collect_with(
        &mut self,
        roots: &dyn RootProvider,
        pending: Option<&HeapObject>,
    ) -> usize {
        let _span = tracing::span!(tracing::Level::DEBUG, "collect").entered();

        let mut work: Vec<ObjectRef> = Vec::new();
        roots.visit_roots(&mut |r| work.push(r));
        if let Some(pending) = pending {
            pending.visit_edges(&mut |r| work.push(r));
        }

        while let Some(r) = work.pop() {
            let Some(cell) = self.cell_mut(r) else {
                debug_assert!(false, "stale reference reached the tracer: {r:?}");
                continue;
            };
            let CellState::Live { object, marked } = &mut cell.state else {
                continue;
            };
            if *marked {
                continue;
            }
            *marked = true;
            object.visit_edges(&mut |edge| work.push(edge));
        }

        let reclaimed = self.pools.iter_mut().map(Pool::sweep).sum();
        self.stats.collections += 1;
        self.stats.last_reclaimed = reclaimed;
        self.stats.total_reclaimed += reclaimed;

        log::trace!(
            "arena: collection #{} reclaimed {reclaimed} cells",
            self.stats.collections
        );
        reclaimed
    }

    fn cell_mut(&mut self, r: ObjectRef) -> Option<&mut Cell> {
        let pool = self.pools.get_mut(r.size_class().0 as usize)?;
        let cell = pool.cell_mut(r.index())?;
        (cell.generation == r.generation()).then_some(cell)
    }

    pub fn get(&self, r: ObjectRef) -> Option<&HeapObject> {
        let pool = self.pools.get(r.size_class().0 as usize)?;
        let cell = pool.cell(r.index())?;
        if cell.generation != r.generation() {
            return None;
        }
        match &cell.state {
            CellState::Live { object, .. } => Some(object),
            CellState::Free { .. } => None,
        }
    }

    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut HeapObject> {
        match &mut self.cell_mut(r)?.state {
            CellState::Live { object, .. } => Some(object),
            CellState::Free { .. } => None,
        }
    }

    #[inline]
    pub fn is_live(&self, r: ObjectRef) -> bool {
        self.get(r).is_some()
    }

    /// Checks `allocated + free == total` for every pool, and that the free
    /// list and the live cells agree with the counters.
    pub fn verify(&self) -> Result<(), ArenaInconsistency> {
        self.pools.iter().try_for_each(Pool::verify)
    }

    /// Frees every superblock. All outstanding references become stale.
    pub fn release_all(&mut self) {
        for pool in &mut self.pools {
            pool.superblocks.clear();
            pool.free_head = None;
            pool.free_cells = 0;
            pool.allocated_cells = 0;
        }
        log::debug!("arena: released all superblocks");
    }

    pub fn stats(&self) -> GarbageCollectionStats {
        self.stats
    }

    pub fn superblock_count(&self, class: SizeClass) -> usize {
        self.pools[class.0 as usize].superblocks.len()
    }

    pub fn cells_per_superblock(&self, class: SizeClass) -> usize {
        self.pools[class.0 as usize].cells_per_superblock
    }

    pub fn allocated_cells(&self) -> usize {
        self.pools.iter().map(|pool| pool.allocated_cells).sum()
    }

    pub fn free_cells(&self) -> usize {
        self.pools.iter().map(|pool| pool.free_cells).sum()
    }

    pub fn total_cells(&self) -> usize {
        self.pools.iter().map(Pool::total_cells).sum()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.release_all();
    }
}
