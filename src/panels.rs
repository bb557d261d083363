use crate::models::{EntityId, PanelSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewMode {
    Single,
    Split,
}

/// Which file sits in each slot of the split view, and which slot has focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelState {
    is_split_view: bool,
    focused_panel: PanelSide,
    left_panel_file_id: Option<EntityId>,
    right_panel_file_id: Option<EntityId>,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            is_split_view: false,
            focused_panel: PanelSide::Left,
            left_panel_file_id: None,
            right_panel_file_id: None,
        }
    }
}

impl PanelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ViewMode {
        if self.is_split_view {
            ViewMode::Split
        } else {
            ViewMode::Single
        }
    }

    pub fn focused(&self) -> PanelSide {
        self.focused_panel
    }

    pub fn file_in(&self, side: PanelSide) -> Option<&EntityId> {
        match side {
            PanelSide::Left => self.left_panel_file_id.as_ref(),
            PanelSide::Right => self.right_panel_file_id.as_ref(),
        }
    }

    /// The file shown when not split: left slot first, right as a fallback.
    pub fn visible_file(&self) -> Option<&EntityId> {
        self.left_panel_file_id
            .as_ref()
            .or(self.right_panel_file_id.as_ref())
    }

    pub fn is_visible(&self, file_id: &EntityId) -> bool {
        match self.mode() {
            ViewMode::Split => {
                self.left_panel_file_id.as_ref() == Some(file_id)
                    || self.right_panel_file_id.as_ref() == Some(file_id)
            }
            ViewMode::Single => self.visible_file() == Some(file_id),
        }
    }

    pub fn set_split_view(&mut self, is_split: bool) {
        self.is_split_view = is_split;
        if !is_split {
            if self.focused_panel == PanelSide::Right && self.right_panel_file_id.is_some() {
                self.left_panel_file_id = self.right_panel_file_id.take();
            }
            self.right_panel_file_id = None;
            self.focused_panel = PanelSide::Left;
        }
    }

    pub fn set_focused_panel(&mut self, side: PanelSide) {
        self.focused_panel = side;
    }

    pub fn set_panel_file(&mut self, side: PanelSide, file_id: EntityId) {
        match side {
            PanelSide::Left => self.left_panel_file_id = Some(file_id),
            PanelSide::Right => {
                self.right_panel_file_id = Some(file_id);
                if self.left_panel_file_id.is_some() {
                    self.is_split_view = true;
                }
            }
        }
    }

    /// Navigation: replaces the focused slot in split view, the sole slot otherwise.
    pub fn open_file(&mut self, file_id: EntityId) {
        match self.mode() {
            ViewMode::Split => match self.focused_panel {
                PanelSide::Left => self.left_panel_file_id = Some(file_id),
                PanelSide::Right => self.right_panel_file_id = Some(file_id),
            },
            ViewMode::Single => {
                self.left_panel_file_id = Some(file_id);
                self.right_panel_file_id = None;
            }
        }
    }

    /// Opens a second file next to the current one, entering split view.
    pub fn open_beside(&mut self, file_id: EntityId) {
        if self.mode() == ViewMode::Single {
            match self.visible_file().cloned() {
                None => {
                    self.open_file(file_id);
                    return;
                }
                Some(current) => {
                    self.left_panel_file_id = Some(current);
                }
            }
        }
        self.right_panel_file_id = Some(file_id);
        self.is_split_view = true;
        self.focused_panel = PanelSide::Right;
    }

    pub fn close_panel(&mut self, side: PanelSide) {
        match side {
            PanelSide::Left => {
                self.left_panel_file_id = self.right_panel_file_id.take();
            }
            PanelSide::Right => {
                self.right_panel_file_id = None;
            }
        }
        // One slot at most is occupied now.
        self.is_split_view = false;
        self.focused_panel = PanelSide::Left;
    }

    /// Closes every slot showing `file_id`.
    pub fn forget_file(&mut self, file_id: &EntityId) {
        if self.right_panel_file_id.as_ref() == Some(file_id) {
            self.close_panel(PanelSide::Right);
        }
        if self.left_panel_file_id.as_ref() == Some(file_id) {
            self.close_panel(PanelSide::Left);
        }
    }

    pub fn replace_file(&mut self, old_id: &EntityId, new_id: &EntityId) {
        for slot in [&mut self.left_panel_file_id, &mut self.right_panel_file_id] {
            if slot.as_ref() == Some(old_id) {
                *slot = Some(new_id.clone());
            }
        }
    }
}
