//! Cross-archetype scans.
//!
//! A query selects every pool whose archetype is a superset of the required
//! kinds, then walks those pools page by page and slot by slot. Within a page
//! the cursor steps by the record size; it never consults an index. Records
//! whose header does not read as occupied are skipped, which covers both free
//! slots and logically destroyed entities still held by an outstanding
//! handle.
//!
//! Pool selection happens once, when the query is created. Pools created
//! afterwards are not visited.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use engine_component::{
    Archetype, Component, ComponentTypeId, MAX_COMPONENT_KINDS, RecordLayout,
};
use serde::{Deserialize, Serialize};

use crate::entity::assert_field_type;
use crate::page::{SlotState, read_header};
use crate::pool::Pool;
use crate::world::World;

/// The kinds a scan needs.
///
/// Pools must contain every `required` kind and none of the `excluded` ones.
/// `optional` kinds do not affect selection; they only ask for a pointer
/// when the pool happens to carry the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Kinds every matching pool contains.
    pub required: Archetype,
    /// Kinds fetched when present.
    pub optional: Archetype,
    /// Kinds no matching pool contains.
    pub excluded: Archetype,
}

impl QueryDescriptor {
    /// Create a descriptor that matches every pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `kind`.
    #[must_use]
    pub fn require(mut self, kind: ComponentTypeId) -> Self {
        self.required = self.required.with(kind);
        self
    }

    /// Fetch `kind` when present.
    #[must_use]
    pub fn optional(mut self, kind: ComponentTypeId) -> Self {
        self.optional = self.optional.with(kind);
        self
    }

    /// Skip pools that contain `kind`.
    #[must_use]
    pub fn without(mut self, kind: ComponentTypeId) -> Self {
        self.excluded = self.excluded.with(kind);
        self
    }

    /// Every kind a row carries a pointer slot for.
    #[must_use]
    pub fn requested(&self) -> Archetype {
        self.required.union(self.optional)
    }

    /// Returns `true` if a pool of `archetype` takes part in the scan.
    #[must_use]
    pub fn matches(&self, archetype: Archetype) -> bool {
        archetype.contains_all(self.required) && !archetype.intersects(self.excluded)
    }
}

/// Position of a scan: `(pool, page, slot)` plus the address of the next
/// record to inspect.
#[derive(Debug)]
struct Cursor {
    pools: Vec<Rc<Pool>>,
    pool_index: usize,
    page_index: usize,
    slot_index: u32,
    /// Next record in the current page, or `None` before the page is entered.
    record: Option<NonNull<u8>>,
}

impl Cursor {
    fn new(pools: Vec<Rc<Pool>>) -> Self {
        Self {
            pools,
            pool_index: 0,
            page_index: 0,
            slot_index: 0,
            record: None,
        }
    }

    fn pool(&self, index: usize) -> &Pool {
        &self.pools[index]
    }

    /// Advance to the next occupied record and return it together with the
    /// index of its pool.
    fn advance(&mut self) -> Option<(usize, NonNull<u8>)> {
        loop {
            let pool = self.pools.get(self.pool_index)?;

            let Some(record) = self.record else {
                match pool.page_base(self.page_index) {
                    Some(base) => {
                        self.record = Some(base);
                        self.slot_index = 0;
                    }
                    None => {
                        self.pool_index += 1;
                        self.page_index = 0;
                    }
                }
                continue;
            };

            if self.slot_index == pool.page_capacity() {
                self.page_index += 1;
                self.record = None;
                continue;
            }

            self.slot_index += 1;
            // SAFETY: `slot_index <= page_capacity`, so the result is at most
            // one past the end of the page.
            self.record = Some(unsafe { record.add(pool.layout().record_size()) });

            // SAFETY: `record` is a record of a page the pool keeps alive, and
            // the cursor holds the pool.
            if unsafe { read_header(record) } == SlotState::Occupied {
                return Some((self.pool_index, record));
            }
        }
    }
}

/// One record yielded by a [`RawQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRow {
    record: NonNull<u8>,
    archetype: Archetype,
    pointers: [Option<NonNull<u8>>; MAX_COMPONENT_KINDS],
}

impl RawRow {
    /// Start of the record.
    #[must_use]
    pub fn record(&self) -> NonNull<u8> {
        self.record
    }

    /// Exact archetype of the record's pool.
    #[must_use]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    /// Pointer to `kind`'s bytes. `None` if the kind was not requested or the
    /// record does not carry it.
    #[must_use]
    pub fn get(&self, kind: ComponentTypeId) -> Option<NonNull<u8>> {
        self.pointers.get(kind.index()).copied().flatten()
    }
}

/// Untyped scan created by [`World::query_raw`].
#[derive(Debug)]
pub struct RawQuery<'w> {
    cursor: Cursor,
    requested: Archetype,
    offsets: [Option<usize>; MAX_COMPONENT_KINDS],
    prepared: Option<usize>,
    _world: PhantomData<&'w World>,
}

impl RawQuery<'_> {
    pub(crate) fn new(pools: Vec<Rc<Pool>>, descriptor: QueryDescriptor) -> Self {
        Self {
            cursor: Cursor::new(pools),
            requested: descriptor.requested(),
            offsets: [None; MAX_COMPONENT_KINDS],
            prepared: None,
            _world: PhantomData,
        }
    }

    /// Number of pools selected for this scan.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.cursor.pools.len()
    }

    fn prepare(&mut self, pool_index: usize) {
        let layout = self.cursor.pool(pool_index).layout();
        self.offsets = [None; MAX_COMPONENT_KINDS];
        for kind in self.requested.kinds() {
            self.offsets[kind.index()] = layout.offset_of(kind);
        }
        self.prepared = Some(pool_index);
    }
}

impl Iterator for RawQuery<'_> {
    type Item = RawRow;

    fn next(&mut self) -> Option<RawRow> {
        let (pool_index, record) = self.cursor.advance()?;
        if self.prepared != Some(pool_index) {
            self.prepare(pool_index);
        }

        let mut pointers = [None; MAX_COMPONENT_KINDS];
        for (pointer, offset) in pointers.iter_mut().zip(self.offsets) {
            // SAFETY: Offsets come from the record's own layout.
            *pointer = offset.map(|offset| unsafe { record.add(offset) });
        }
        Some(RawRow {
            record,
            archetype: self.cursor.pool(pool_index).archetype(),
            pointers,
        })
    }
}

/// A parameter of a typed [`Query`].
///
/// Implemented for [`Ptr<T>`] (required), `Option<Ptr<T>>` (optional) and
/// tuples of up to eight parameters.
pub trait QueryParam {
    /// What each row yields.
    type Item;
    /// Per-pool data computed once when the scan enters a pool.
    type State: Copy;

    /// Add this parameter's kinds to `descriptor`.
    fn describe(descriptor: QueryDescriptor) -> QueryDescriptor;

    /// Resolve offsets against a matching pool's layout.
    fn prepare(layout: &RecordLayout) -> Self::State;

    /// Build the row for `record`.
    ///
    /// # Safety
    ///
    /// `record` must be an occupied record of the pool `state` was prepared
    /// for.
    unsafe fn fetch(state: Self::State, record: NonNull<u8>) -> Self::Item;
}

/// Requests a pointer to component `T`, which every matching record carries.
pub struct Ptr<T>(PhantomData<fn() -> T>);

impl<T: Component> QueryParam for Ptr<T> {
    type Item = NonNull<T>;
    type State = usize;

    fn describe(descriptor: QueryDescriptor) -> QueryDescriptor {
        descriptor.require(T::TYPE_ID)
    }

    fn prepare(layout: &RecordLayout) -> usize {
        let Some(field) = layout.field(T::TYPE_ID) else {
            panic!(
                "pool {} selected without required component `{}`",
                layout.archetype(),
                T::type_name()
            );
        };
        assert_field_type::<T>(field);
        field.offset
    }

    unsafe fn fetch(offset: usize, record: NonNull<u8>) -> NonNull<T> {
        // SAFETY: `offset` lies inside the record.
        unsafe { record.add(offset) }.cast()
    }
}

impl<T: Component> QueryParam for Option<Ptr<T>> {
    type Item = Option<NonNull<T>>;
    type State = Option<usize>;

    fn describe(descriptor: QueryDescriptor) -> QueryDescriptor {
        descriptor.optional(T::TYPE_ID)
    }

    fn prepare(layout: &RecordLayout) -> Option<usize> {
        layout.field(T::TYPE_ID).map(|field| {
            assert_field_type::<T>(field);
            field.offset
        })
    }

    unsafe fn fetch(offset: Option<usize>, record: NonNull<u8>) -> Option<NonNull<T>> {
        // SAFETY: `offset` lies inside the record.
        offset.map(|offset| unsafe { record.add(offset) }.cast())
    }
}

macro_rules! impl_query_param_tuple {
    ($($param:ident),+) => {
        impl<$($param: QueryParam),+> QueryParam for ($($param,)+) {
            type Item = ($($param::Item,)+);
            type State = ($($param::State,)+);

            fn describe(descriptor: QueryDescriptor) -> QueryDescriptor {
                $(let descriptor = $param::describe(descriptor);)+
                descriptor
            }

            fn prepare(layout: &RecordLayout) -> Self::State {
                ($($param::prepare(layout),)+)
            }

            #[allow(non_snake_case)]
            unsafe fn fetch(state: Self::State, record: NonNull<u8>) -> Self::Item {
                let ($($param,)+) = state;
                // SAFETY: Forwarded from the caller.
                unsafe { ($($param::fetch($param, record),)+) }
            }
        }
    };
}

impl_query_param_tuple!(A);
impl_query_param_tuple!(A, B);
impl_query_param_tuple!(A, B, C);
impl_query_param_tuple!(A, B, C, D);
impl_query_param_tuple!(A, B, C, D, E);
impl_query_param_tuple!(A, B, C, D, E, F);
impl_query_param_tuple!(A, B, C, D, E, F, G);
impl_query_param_tuple!(A, B, C, D, E, F, G, H);

/// Typed scan created by [`World::query`].
///
/// Rows are raw pointers. They stay valid while the record is held, but the
/// scan does not stop two rows (or a row and an [`EntityHandle`](crate::EntityHandle))
/// from aliasing the same component; dereferencing is the caller's
/// responsibility.
pub struct Query<'w, Q: QueryParam> {
    cursor: Cursor,
    state: Option<(usize, Q::State)>,
    _marker: PhantomData<(&'w World, fn() -> Q)>,
}

impl<Q: QueryParam> Query<'_, Q> {
    pub(crate) fn new(pools: Vec<Rc<Pool>>) -> Self {
        Self {
            cursor: Cursor::new(pools),
            state: None,
            _marker: PhantomData,
        }
    }

    /// Number of pools selected for this scan.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.cursor.pools.len()
    }
}

impl<Q: QueryParam> Iterator for Query<'_, Q> {
    type Item = Q::Item;

    fn next(&mut self) -> Option<Q::Item> {
        let (pool_index, record) = self.cursor.advance()?;
        let state = match self.state {
            Some((prepared, state)) if prepared == pool_index => state,
            _ => {
                let state = Q::prepare(self.cursor.pool(pool_index).layout());
                self.state = Some((pool_index, state));
                state
            }
        };
        // SAFETY: The cursor only yields occupied records of that pool.
        Some(unsafe { Q::fetch(state, record) })
    }
}

#[cfg(test)]
mod tests {
    use engine_component::{ComponentCatalog, ComponentMeta};

    use super::*;
    use crate::{EntityHandle, StorageConfig};

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32, f32);

    impl Component for Position {
        const TYPE_ID: ComponentTypeId = ComponentTypeId::new(0);
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(f32, f32);

    impl Component for Velocity {
        const TYPE_ID: ComponentTypeId = ComponentTypeId::new(1);
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Mesh(u32);

    impl Component for Mesh {
        const TYPE_ID: ComponentTypeId = ComponentTypeId::new(2);
        fn type_name() -> &'static str {
            "Mesh"
        }
    }

    const SKINNED_MESH: ComponentTypeId = ComponentTypeId(3);

    fn world() -> World {
        let mut catalog = ComponentCatalog::new();
        catalog.register::<Position>().unwrap();
        catalog.register::<Velocity>().unwrap();
        catalog.register::<Mesh>().unwrap();
        catalog
            .register_meta(ComponentMeta::of::<Mesh>(SKINNED_MESH, "SkinnedMesh"))
            .unwrap();
        catalog.alias(Mesh::TYPE_ID, SKINNED_MESH).unwrap();
        World::with_config(catalog, StorageConfig::new().with_page_capacity(4)).unwrap()
    }

    fn spawn_moving(world: &mut World, x: f32) -> EntityHandle {
        world
            .create_entity(Archetype::from_kinds([Position::TYPE_ID, Velocity::TYPE_ID]))
            .unwrap()
            .with(Position(x, 0.0))
            .with(Velocity(1.0, 2.0))
            .spawn()
            .unwrap()
    }

    fn spawn_static(world: &mut World, x: f32) -> EntityHandle {
        world
            .create_entity(Archetype::EMPTY.with(Position::TYPE_ID))
            .unwrap()
            .with(Position(x, 0.0))
            .spawn()
            .unwrap()
    }

    #[test]
    fn test_descriptor_matching() {
        let descriptor = QueryDescriptor::new()
            .require(ComponentTypeId(0))
            .optional(ComponentTypeId(1))
            .without(ComponentTypeId(2));

        assert_eq!(
            descriptor.requested(),
            Archetype::from_kinds([ComponentTypeId(0), ComponentTypeId(1)])
        );
        assert!(descriptor.matches(Archetype::from_bits(0b0001)));
        assert!(descriptor.matches(Archetype::from_bits(0b1011)));
        assert!(!descriptor.matches(Archetype::from_bits(0b0010)));
        assert!(!descriptor.matches(Archetype::from_bits(0b0101)));

        assert!(QueryDescriptor::new().matches(Archetype::EMPTY));
    }

    #[test]
    fn test_empty_world_yields_nothing() {
        let world = world();
        assert_eq!(world.query::<Ptr<Position>>().count(), 0);
        assert_eq!(world.query_raw(QueryDescriptor::new()).count(), 0);
    }

    #[test]
    fn test_typed_query_mutates_in_place() {
        let mut world = world();
        let movers: Vec<_> = (0..3).map(|i| spawn_moving(&mut world, i as f32)).collect();
        let still = spawn_static(&mut world, 10.0);

        for (mut position, velocity) in world.query::<(Ptr<Position>, Ptr<Velocity>)>() {
            // SAFETY: Each row points into a distinct record and no other
            // reference is alive.
            unsafe {
                let velocity = velocity.read();
                position.as_mut().0 += velocity.0;
                position.as_mut().1 += velocity.1;
            }
        }

        for (i, handle) in movers.iter().enumerate() {
            assert_eq!(handle.read::<Position>(), Some(Position(i as f32 + 1.0, 2.0)));
        }
        assert_eq!(still.read::<Position>(), Some(Position(10.0, 0.0)));
    }

    #[test]
    fn test_optional_component_is_null_when_absent() {
        let mut world = world();
        spawn_moving(&mut world, 0.0);
        spawn_static(&mut world, 1.0);
        spawn_static(&mut world, 2.0);

        let rows: Vec<_> = world
            .query::<(Ptr<Position>, Option<Ptr<Velocity>>)>()
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().filter(|(_, velocity)| velocity.is_some()).count(), 1);
    }

    #[test]
    fn test_without_filter() {
        let mut world = world();
        spawn_moving(&mut world, 0.0);
        spawn_static(&mut world, 1.0);

        let rows = world
            .query_raw(
                QueryDescriptor::new()
                    .require(Position::TYPE_ID)
                    .without(Velocity::TYPE_ID),
            )
            .count();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_scan_spans_pages_and_skips_holes() {
        let mut world = world();
        let mut handles: Vec<_> = (0..10).map(|i| spawn_static(&mut world, i as f32)).collect();
        assert_eq!(world.pool_stats()[0].pages, 3);

        // Empty the middle page entirely and punch one hole in the first.
        for handle in handles.drain(4..8) {
            world.destroy(&handle);
        }
        let first = handles.remove(0);
        world.destroy(&first);
        drop(first);

        let mut seen: Vec<f32> = world
            .query::<Ptr<Position>>()
            // SAFETY: Records are initialised and not mutated during the scan.
            .map(|position| unsafe { position.read() }.0)
            .collect();
        seen.sort_by(f32::total_cmp);
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 8.0, 9.0]);
    }

    #[test]
    fn test_retired_record_hidden_while_held() {
        let mut world = world();
        let kept = spawn_static(&mut world, 0.0);
        let other = spawn_static(&mut world, 1.0);
        world.destroy(&kept);

        let rows: Vec<_> = world
            .query_raw(QueryDescriptor::new().require(Position::TYPE_ID))
            .map(|row| row.record())
            .collect();
        assert_eq!(rows, vec![other.record_ptr()]);
    }

    #[test]
    fn test_alias_resolves_optional_lookup() {
        let mut world = world();
        let skinned = world
            .create_entity(Archetype::from_kinds([Position::TYPE_ID, SKINNED_MESH]))
            .unwrap()
            .with(Position(0.0, 0.0))
            .with_kind(SKINNED_MESH, Mesh(7))
            .spawn()
            .unwrap();

        // The alias does not widen pool selection...
        assert_eq!(world.query::<Ptr<Mesh>>().count(), 0);

        // ...but an optional lookup falls back to the skinned mesh.
        let meshes: Vec<_> = world
            .query::<(Ptr<Position>, Option<Ptr<Mesh>>)>()
            .filter_map(|(_, mesh)| mesh)
            // SAFETY: The record is initialised.
            .map(|mesh| unsafe { mesh.read() })
            .collect();
        assert_eq!(meshes, vec![Mesh(7)]);
        assert_eq!(skinned.read::<Mesh>(), Some(Mesh(7)));

        let row = world
            .query_raw(QueryDescriptor::new().optional(Mesh::TYPE_ID))
            .next()
            .unwrap();
        assert_eq!(row.get(Mesh::TYPE_ID), skinned.get_raw(SKINNED_MESH));
    }

    #[test]
    fn test_pool_selection_is_fixed_at_creation() {
        let mut world = world();
        spawn_static(&mut world, 0.0);
        let query = world.query::<Ptr<Position>>();
        assert_eq!(query.pool_count(), 1);
        drop(query);

        spawn_moving(&mut world, 0.0);
        assert_eq!(world.query::<Ptr<Position>>().pool_count(), 2);
        assert_eq!(world.query::<Ptr<Velocity>>().pool_count(), 1);
    }

    #[test]
    fn test_raw_row_reports_archetype() {
        let mut world = world();
        spawn_moving(&mut world, 0.0);
        let row = world
            .query_raw(QueryDescriptor::new().require(Velocity::TYPE_ID))
            .next()
            .unwrap();
        assert_eq!(
            row.archetype(),
            Archetype::from_kinds([Position::TYPE_ID, Velocity::TYPE_ID])
        );
        assert!(row.get(Position::TYPE_ID).is_none());
        assert!(row.get(ComponentTypeId(200)).is_none());
    }
}
