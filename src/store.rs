// The authoritative model of all overlay layers and the single active one.
//
// Every mutation builds a brand-new collection: exactly one element is
// replaced, added or removed, the untouched layers are shared by `Arc`
// and stay pointer-identical across snapshots. Stale ids are no-ops.

use std::sync::Arc;

use kurbo::{Point, Vec2};

use crate::layer::{Layer, LayerId, LayerPatch, Product};

/// Where a freshly added layer lands.
pub const DEFAULT_POSITION: Point = Point::new(40.0, 80.0);
pub const DEFAULT_OPACITY: f64 = 0.95;

/// Where the deep-link layer lands.
pub const SEED_POSITION: Point = Point::new(30.0, 50.0);
pub const SEED_OPACITY: f64 = 0.97;

/// Offset applied to a duplicate so it doesn't hide its source.
pub const DUPLICATE_OFFSET: Vec2 = Vec2::new(20.0, 20.0);

/// Immutable view of the layer collection, in insertion order.
pub type LayerSet = Arc<[Arc<Layer>]>;

/// Direction for [`LayerStore::reorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZStep {
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub struct LayerStore {
    layers: LayerSet,
    active: Option<LayerId>,
    next_id: u64,
    revision: u64,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    pub fn new() -> Self {
        Self {
            layers: Arc::from(Vec::new()),
            active: None,
            next_id: 1,
            revision: 0,
        }
    }

    /// Current snapshot. Cheap: clones one `Arc`.
    pub fn layers(&self) -> LayerSet {
        Arc::clone(&self.layers)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&Arc<Layer>> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn active_id(&self) -> Option<LayerId> {
        self.active
    }

    pub fn active(&self) -> Option<&Arc<Layer>> {
        self.active.and_then(|id| self.get(id))
    }

    /// Bumped on every change that produced a new snapshot or selection.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Layers in paint order: ascending z, ties in insertion order.
    pub fn paint_order(&self) -> Vec<Arc<Layer>> {
        paint_order(&self.layers)
    }

    fn allocate_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }

    fn commit(&mut self, layers: Vec<Arc<Layer>>) {
        self.layers = Arc::from(layers);
        self.revision += 1;
    }

    /// Append a layer for `product` at the default placement and make it active.
    pub fn add_layer(&mut self, product: Product) -> LayerId {
        let id = self.allocate_id();
        let layer = Layer {
            id,
            product,
            position: DEFAULT_POSITION,
            scale: 1.0,
            opacity: DEFAULT_OPACITY,
            rotation: 0.0,
            z_order: self.z_for_new(),
        };
        self.push(layer);
        log::debug!("added {id}");
        id
    }

    /// Replace everything with the single deep-link layer (z = 0, active).
    pub fn seed(&mut self, product: Product) -> LayerId {
        let id = self.allocate_id();
        let layer = Layer {
            id,
            product,
            position: SEED_POSITION,
            scale: 1.0,
            opacity: SEED_OPACITY,
            rotation: 0.0,
            z_order: 0,
        };
        self.commit(vec![Arc::new(layer)]);
        self.active = Some(id);
        log::info!("seeded {id} from deep link");
        id
    }

    /// Clone `id` into a new, slightly offset layer on top; `None` for stale ids.
    pub fn duplicate(&mut self, id: LayerId) -> Option<LayerId> {
        let source = self.get(id)?.as_ref().clone();
        let new_id = self.allocate_id();
        let layer = Layer {
            id: new_id,
            position: source.position + DUPLICATE_OFFSET,
            z_order: self.z_for_new(),
            ..source
        };
        self.push(layer);
        log::debug!("duplicated {id} as {new_id}");
        Some(new_id)
    }

    fn z_for_new(&self) -> i32 {
        i32::try_from(self.layers.len()).unwrap_or(i32::MAX)
    }

    fn push(&mut self, layer: Layer) {
        let id = layer.id;
        let mut next: Vec<Arc<Layer>> = self.layers.iter().cloned().collect();
        next.push(Arc::new(layer));
        self.commit(next);
        self.active = Some(id);
    }

    /// Apply `patch` to the layer `id`, clamped. Unknown ids are ignored:
    /// deletions can race with queued UI events.
    pub fn update_layer(&mut self, id: LayerId, patch: &LayerPatch) {
        let Some(index) = self.layers.iter().position(|l| l.id == id) else {
            log::trace!("update on stale {id} ignored");
            return;
        };
        /* 1) Build the replacement (clamped, non-finite fields ignored). */
        let replacement = Arc::new(self.layers[index].patched(patch));
        /* 2) New snapshot: untouched layers are the same Arc as before.
           Visual: only the edited garment redraws differently. */
        let next = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| if i == index { Arc::clone(&replacement) } else { Arc::clone(l) })
            .collect();
        self.commit(next);
    }

    /// Remove `id`; clears the selection in the same step if it pointed there.
    /// Visual: the garment disappears and no blue ring is left behind.
    pub fn remove_layer(&mut self, id: LayerId) {
        if self.get(id).is_none() {
            return;
        }
        let next = self.layers.iter().filter(|l| l.id != id).cloned().collect();
        self.commit(next);
        if self.active == Some(id) {
            self.active = None;
        }
        log::debug!("removed {id}");
    }

    /// Select `id` (must exist) or clear the selection with `None`.
    pub fn set_active(&mut self, id: Option<LayerId>) {
        match id {
            Some(id) if self.get(id).is_none() => {}
            _ if self.active == id => {}
            _ => {
                self.active = id;
                self.revision += 1;
            }
        }
    }

    /// Move `id` one z-step; backward is floored at 0.
    pub fn reorder(&mut self, id: LayerId, step: ZStep) {
        let Some(layer) = self.get(id) else {
            return;
        };
        let z = match step {
            ZStep::Forward => layer.z_order.saturating_add(1),
            ZStep::Backward => layer.z_order.saturating_sub(1).max(0),
        };
        self.update_layer(id, &LayerPatch { z_order: Some(z), ..LayerPatch::default() });
    }

    /// Move the selection to the next layer in paint order (wraps around).
    pub fn cycle_active(&mut self) {
        let order = self.paint_order();
        if order.is_empty() {
            return;
        }
        let next = match self.active.and_then(|id| order.iter().position(|l| l.id == id)) {
            Some(i) => order[(i + 1) % order.len()].id,
            None => order[0].id,
        };
        self.set_active(Some(next));
    }
}

/// Stable ascending sort by z over any snapshot.
pub fn paint_order(layers: &[Arc<Layer>]) -> Vec<Arc<Layer>> {
    let mut sorted: Vec<Arc<Layer>> = layers.to_vec();
    sorted.sort_by_key(|l| l.z_order);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Category;

    fn product(tag: &str) -> Product {
        Product {
            id: format!("manual-{tag}"),
            brand: "Manual".into(),
            name: tag.into(),
            category: Category::Top,
            image_source: format!("/{tag}.png"),
        }
    }

    #[test]
    fn first_add_is_z0_and_active() {
        let mut store = LayerStore::new();
        let id = store.add_layer(product("a"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).unwrap().z_order, 0);
        assert_eq!(store.active_id(), Some(id));
        let l = store.get(id).unwrap();
        assert_eq!(l.scale, 1.0);
        assert_eq!(l.opacity, DEFAULT_OPACITY);
        assert_eq!(l.rotation, 0.0);
    }

    #[test]
    fn sequential_adds_get_increasing_z_and_distinct_ids() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        let b = store.add_layer(product("a"));
        assert_ne!(a, b);
        assert_eq!(store.get(a).unwrap().z_order, 0);
        assert_eq!(store.get(b).unwrap().z_order, 1);
        assert_eq!(store.active_id(), Some(b));
    }

    #[test]
    fn update_clamps_out_of_range_values() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        for v in [-10.0, 0.0, 0.31, 1.0, 2.49, 7.0, 1e9] {
            store.update_layer(a, &LayerPatch { scale: Some(v), opacity: Some(v), rotation: Some(v * 10.0), ..LayerPatch::default() });
            let l = store.get(a).unwrap();
            assert!((0.3..=2.5).contains(&l.scale));
            assert!((0.2..=1.0).contains(&l.opacity));
            assert!((-45.0..=45.0).contains(&l.rotation));
        }
    }

    #[test]
    fn update_swaps_collection_but_keeps_unrelated_layers() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        let b = store.add_layer(product("b"));
        let before = store.layers();
        store.update_layer(a, &LayerPatch::scale(2.0));
        let after = store.layers();

        assert!(!Arc::ptr_eq(&before, &after));
        let b_before = before.iter().find(|l| l.id == b).unwrap();
        let b_after = after.iter().find(|l| l.id == b).unwrap();
        assert!(Arc::ptr_eq(b_before, b_after));
        // old snapshot untouched
        assert_eq!(before.iter().find(|l| l.id == a).unwrap().scale, 1.0);
    }

    #[test]
    fn stale_ids_are_noops() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        store.remove_layer(a);
        let before = store.layers();
        store.update_layer(a, &LayerPatch::scale(2.0));
        store.reorder(a, ZStep::Forward);
        store.remove_layer(a);
        store.set_active(Some(a));
        assert!(Arc::ptr_eq(&before, &store.layers()));
        assert_eq!(store.active_id(), None);
        assert!(store.duplicate(a).is_none());
    }

    #[test]
    fn removing_active_clears_selection() {
        let mut store = LayerStore::new();
        let _a = store.add_layer(product("a"));
        let b = store.add_layer(product("b"));
        store.remove_layer(b);
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn removing_other_layer_keeps_selection() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        let b = store.add_layer(product("b"));
        store.remove_layer(a);
        assert_eq!(store.active_id(), Some(b));
    }

    #[test]
    fn reorder_floors_at_zero() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        store.reorder(a, ZStep::Backward);
        assert_eq!(store.get(a).unwrap().z_order, 0);
        store.reorder(a, ZStep::Forward);
        store.reorder(a, ZStep::Forward);
        assert_eq!(store.get(a).unwrap().z_order, 2);
    }

    #[test]
    fn backward_from_extreme_z_does_not_overflow() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        store.update_layer(a, &LayerPatch { z_order: Some(i32::MIN), ..LayerPatch::default() });
        store.reorder(a, ZStep::Backward);
        assert_eq!(store.get(a).unwrap().z_order, 0);
        store.update_layer(a, &LayerPatch { z_order: Some(i32::MAX), ..LayerPatch::default() });
        store.reorder(a, ZStep::Forward);
        assert_eq!(store.get(a).unwrap().z_order, i32::MAX);
    }

    #[test]
    fn equal_z_keeps_insertion_order() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        let b = store.add_layer(product("b"));
        let c = store.add_layer(product("c"));
        // a: 0 -> 1, now ties with b
        store.reorder(a, ZStep::Forward);
        for _ in 0..5 {
            store.update_layer(c, &LayerPatch::opacity(0.5));
            store.update_layer(b, &LayerPatch::rotation(3.0));
        }
        let order: Vec<LayerId> = store.paint_order().iter().map(|l| l.id).collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn seed_replaces_collection() {
        let mut store = LayerStore::new();
        store.add_layer(product("a"));
        let s = store.seed(product("linked"));
        assert_eq!(store.len(), 1);
        let l = store.get(s).unwrap();
        assert_eq!(l.z_order, 0);
        assert_eq!(l.position, SEED_POSITION);
        assert_eq!(store.active_id(), Some(s));
    }

    #[test]
    fn duplicate_owns_its_own_product_copy() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        let d = store.duplicate(a).unwrap();
        assert_ne!(a, d);
        let (la, ld) = (store.get(a).unwrap(), store.get(d).unwrap());
        assert_eq!(la.product, ld.product);
        assert_eq!(ld.position, la.position + DUPLICATE_OFFSET);
        assert_eq!(ld.z_order, 1);
        assert_eq!(store.active_id(), Some(d));
    }

    #[test]
    fn set_active_rejects_unknown() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        store.set_active(Some(LayerId(999)));
        assert_eq!(store.active_id(), Some(a));
        store.set_active(None);
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn cycle_walks_paint_order() {
        let mut store = LayerStore::new();
        let a = store.add_layer(product("a"));
        let b = store.add_layer(product("b"));
        store.cycle_active();
        assert_eq!(store.active_id(), Some(a));
        store.cycle_active();
        assert_eq!(store.active_id(), Some(b));
    }
}
