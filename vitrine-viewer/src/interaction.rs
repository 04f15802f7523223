//! Pointer interaction for the showcase
//!
//! The coordinator tracks which model is selected and routes picks and drags
//! to the picked model's behavior. State machine:
//!
//! ```text
//! no selection --pick(model)--> selected(model) --pick(other)--> selected(other)
//!                                     |
//!                                     +--pick(model)--> run the model's click behavior
//! ```

use crate::dial::{BoundedDial, TimelineScrub, ZOOM_FACTOR};
use crate::error::{Result, ViewerError};
use crate::showcase::ShowcaseScene;
use log::debug;
use web_time::Instant;

/// How a model reacts to clicks and drags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBehavior {
    /// A click on the selected model plays all of its animation groups
    PlayOnClick,
    /// The part whose name contains `drag_part` drives the dose dial;
    /// clicks elsewhere reset the dial and play all animation groups
    DoseDial {
        /// Substring identifying the draggable part
        drag_part: String,
    },
}

impl ModelBehavior {
    /// Dose dial driven by the `Cylinder005` part
    pub fn dose_dial() -> Self {
        ModelBehavior::DoseDial {
            drag_part: "Cylinder005".to_string(),
        }
    }

    /// Whether `part` is the draggable part of this behavior
    pub fn is_drag_part(&self, part: &str) -> bool {
        match self {
            ModelBehavior::PlayOnClick => false,
            ModelBehavior::DoseDial { drag_part } => part.contains(drag_part.as_str()),
        }
    }
}

/// Pointer input resolved to a model part
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    /// Click on a part of a model
    Pick {
        /// Model title
        model: String,
        /// Node name of the picked part
        part: String,
    },
    /// Drag along the X axis that started on a part of a model
    Drag {
        /// Model title
        model: String,
        /// Node name of the dragged part
        part: String,
        /// Pointer travel since the last drag event
        drag_distance: f32,
    },
}

/// What handling an event did
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    /// The model became the active item
    Selected(String),
    /// The model's animation groups were started
    Played(String),
    /// The dial moved and its model scrubbed the timeline
    Scrubbed(TimelineScrub),
    /// Nothing reacted to the event
    Ignored,
}

/// Selection and dial state of one showcase session
#[derive(Debug, Clone, Default)]
pub struct InteractionCoordinator {
    active_item: Option<String>,
    dial: BoundedDial,
    dial_owner: Option<String>,
}

impl InteractionCoordinator {
    /// Coordinator with nothing selected and the dial at rest
    pub fn new() -> Self {
        Self::default()
    }

    /// Title of the selected model
    pub fn active_item(&self) -> Option<&str> {
        self.active_item.as_deref()
    }

    /// The dose dial
    pub fn dial(&self) -> &BoundedDial {
        &self.dial
    }

    /// Text of the dose label
    pub fn label(&self) -> String {
        format!("Dose: {}", self.dial.dose())
    }

    /// Select `title`: aim the camera at it and check its selector button
    pub fn set_active_item(&mut self, title: &str, scene: &mut ShowcaseScene) -> Result<()> {
        let position = scene
            .model(title)
            .map(|entry| entry.position)
            .ok_or_else(|| ViewerError::UnknownModel(title.to_string()))?;
        self.active_item = Some(title.to_string());
        scene.camera.target = position;
        scene.selector.check(title);
        debug!("Active item: {}", title);
        Ok(())
    }

    /// Route one pointer event
    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        scene: &mut ShowcaseScene,
        now: Instant,
    ) -> Result<InteractionOutcome> {
        match event {
            PointerEvent::Pick { model, part } => self.handle_pick(&model, &part, scene),
            PointerEvent::Drag {
                model,
                part,
                drag_distance,
            } => self.handle_drag(&model, &part, drag_distance, scene, now),
        }
    }

    fn handle_pick(
        &mut self,
        model: &str,
        part: &str,
        scene: &mut ShowcaseScene,
    ) -> Result<InteractionOutcome> {
        let position = scene
            .model(model)
            .map(|entry| entry.position)
            .ok_or_else(|| ViewerError::UnknownModel(model.to_string()))?;
        scene.camera.target = position;

        if self.active_item.as_deref() != Some(model) {
            self.set_active_item(model, scene)?;
            return Ok(InteractionOutcome::Selected(model.to_string()));
        }

        let Some(entry) = scene.model_mut(model) else {
            return Ok(InteractionOutcome::Ignored);
        };
        if let ModelBehavior::DoseDial { .. } = entry.behavior {
            if entry.behavior.is_drag_part(part) {
                return Ok(InteractionOutcome::Ignored);
            }
            self.dial.snap_to_start();
        }
        entry.start_all_groups();
        Ok(InteractionOutcome::Played(model.to_string()))
    }

    fn handle_drag(
        &mut self,
        model: &str,
        part: &str,
        drag_distance: f32,
        scene: &mut ShowcaseScene,
        now: Instant,
    ) -> Result<InteractionOutcome> {
        let entry = scene
            .model_mut(model)
            .ok_or_else(|| ViewerError::UnknownModel(model.to_string()))?;
        if !entry.behavior.is_drag_part(part) {
            return Ok(InteractionOutcome::Ignored);
        }
        let Some(group) = entry.groups.first_mut() else {
            return Ok(InteractionOutcome::Ignored);
        };
        if group.is_playing() {
            return Ok(InteractionOutcome::Ignored);
        }

        let scrub = self.dial.apply_drag(drag_distance, ZOOM_FACTOR, now);
        group.start(false, scrub.speed, scrub.from, scrub.to);
        self.dial_owner = Some(model.to_string());
        Ok(InteractionOutcome::Scrubbed(scrub))
    }

    /// Fire the dial's spring-back once the pointer has been idle long enough
    pub fn poll(&mut self, scene: &mut ShowcaseScene, now: Instant) -> Option<TimelineScrub> {
        let scrub = self.dial.poll_idle(now)?;
        let group = self
            .dial_owner
            .as_deref()
            .and_then(|owner| scene.model_mut(owner))
            .and_then(|entry| entry.groups.first_mut());
        if let Some(group) = group {
            group.start(false, scrub.speed, scrub.from, scrub.to);
        }
        debug!("Dial returned to rest, {}", self.label());
        Some(scrub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_part_matching() {
        let dial = ModelBehavior::dose_dial();
        assert!(dial.is_drag_part("Cylinder005_primitive0"));
        assert!(dial.is_drag_part("Cylinder005"));
        assert!(!dial.is_drag_part("Cylinder004"));
        assert!(!ModelBehavior::PlayOnClick.is_drag_part("Cylinder005"));
    }

    #[test]
    fn test_label_starts_at_zero() {
        let coordinator = InteractionCoordinator::new();
        assert_eq!(coordinator.label(), "Dose: 0");
        assert!(coordinator.active_item().is_none());
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let mut coordinator = InteractionCoordinator::new();
        let mut scene = ShowcaseScene::new();
        let event = PointerEvent::Pick {
            model: "ghost".to_string(),
            part: "x".to_string(),
        };
        assert!(matches!(
            coordinator.handle_pointer(event, &mut scene, Instant::now()),
            Err(ViewerError::UnknownModel(_))
        ));
    }
}
