// Pointer interaction: turns raw mouse/touch events into layer moves.
//
// Two states, Idle and Dragging. A drag stores where the pointer and the layer
// were at pointer-down; every move re-derives the position from those two, so
// the result is pure delta addition in stage-local space. The mirror flag never
// enters here: it's a presentation concern of the renderer.

use kurbo::{Point, Size};

use crate::layer::{LayerId, LayerPatch};
use crate::store::LayerStore;

/// The stage element's on-screen rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageBounds {
    pub origin: Point,
    pub size: Size,
}

impl StageBounds {
    /// `None` when the stage has no area (not mounted / not measurable).
    pub fn measure(origin: Point, size: Size) -> Option<Self> {
        (size.width > 0.0 && size.height > 0.0).then_some(Self { origin, size })
    }

    /// Client (window) coordinates to stage-local coordinates.
    pub fn to_local(&self, client: Point) -> Point {
        (client - self.origin).to_point()
    }
}

/// Raw input, already tagged with the layer under the pointer (if any) for
/// the events that can start a drag.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    Down { position: Point, target: Option<LayerId> },
    TouchStart { touches: Vec<Point>, target: Option<LayerId> },
    Move { position: Point },
    TouchMove { touches: Vec<Point> },
    Up,
    Leave,
    TouchEnd,
    TouchCancel,
}

/// Alive only while a button/touch is held on a layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub layer_id: LayerId,
    /// Stage-local pointer position at pointer-down.
    pub pointer_start: Point,
    /// Layer position at pointer-down.
    pub layer_start: Point,
}

/// Owns the single in-flight drag.
#[derive(Debug, Default)]
pub struct PointerController {
    session: Option<DragSession>,
}

impl PointerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    /// Dispatch one event. `stage` is re-measured by the caller per event.
    pub fn handle(&mut self, event: PointerEvent, stage: Option<StageBounds>, store: &mut LayerStore) {
        match event {
            PointerEvent::Down { position, target } => {
                if let Some(id) = target {
                    self.pointer_down(store, stage, id, position);
                }
            }
            PointerEvent::TouchStart { touches, target } => {
                if let (Some(&first), Some(id)) = (touches.first(), target) {
                    self.pointer_down(store, stage, id, first);
                }
            }
            PointerEvent::Move { position } => self.pointer_move(store, stage, position),
            PointerEvent::TouchMove { touches } => {
                if let Some(&first) = touches.first() {
                    self.pointer_move(store, stage, first);
                }
            }
            PointerEvent::Up | PointerEvent::Leave | PointerEvent::TouchEnd | PointerEvent::TouchCancel => {
                self.end();
            }
        }
    }

    /// Idle → Dragging. Ignored while another drag is alive, when the stage
    /// can't be measured, or when `layer` no longer exists.
    pub fn pointer_down(&mut self, store: &mut LayerStore, stage: Option<StageBounds>, layer: LayerId, client: Point) -> bool {
        if self.session.is_some() {
            return false;
        }
        let Some(stage) = stage else {
            log::debug!("pointer-down ignored: stage not measurable");
            return false;
        };
        let Some(current) = store.get(layer) else {
            return false;
        };
        /* Remember where both the pointer and the layer started.
           Visual: the garment gets the blue ring and sticks to the cursor. */
        self.session = Some(DragSession {
            layer_id: layer,
            pointer_start: stage.to_local(client),
            layer_start: current.position,
        });
        store.set_active(Some(layer));
        true
    }

    /// Dragging → Dragging: position = start + (pointer − pointer_start).
    pub fn pointer_move(&mut self, store: &mut LayerStore, stage: Option<StageBounds>, client: Point) {
        let (Some(session), Some(stage)) = (self.session, stage) else {
            return;
        };
        if store.get(session.layer_id).is_none() {
            // layer removed mid-drag
            self.session = None;
            return;
        }
        // raw delta: the mirror flag never enters here
        let delta = stage.to_local(client) - session.pointer_start;
        store.update_layer(session.layer_id, &LayerPatch::position(session.layer_start + delta));
    }

    /// Dragging → Idle. No layer mutation.
    pub fn end(&mut self) {
        self.session = None;
    }
}
