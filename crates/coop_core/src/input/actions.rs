use crate::math::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    Primary,
    Guard,
    Dash,
    Confirm,
    Cancel,
    Leave,
    NavigatePrev,
    NavigateNext,
}

const ACTION_COUNT: usize = 8;

impl InputAction {
    pub const ALL: [InputAction; ACTION_COUNT] = [
        InputAction::Primary,
        InputAction::Guard,
        InputAction::Dash,
        InputAction::Confirm,
        InputAction::Cancel,
        InputAction::Leave,
        InputAction::NavigatePrev,
        InputAction::NavigateNext,
    ];

    const fn index(self) -> usize {
        match self {
            InputAction::Primary => 0,
            InputAction::Guard => 1,
            InputAction::Dash => 2,
            InputAction::Confirm => 3,
            InputAction::Cancel => 4,
            InputAction::Leave => 5,
            InputAction::NavigatePrev => 6,
            InputAction::NavigateNext => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub fn press(&mut self, action: InputAction) {
        self.set(action, true);
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }

    pub fn with(mut self, action: InputAction) -> Self {
        self.press(action);
        self
    }

    /// Actions down in `self` that were up in `previous`.
    pub fn rising_edges(&self, previous: &ActionStates) -> ActionStates {
        let mut edges = ActionStates::default();
        for action in InputAction::ALL {
            edges.set(action, self.is_down(action) && !previous.is_down(action));
        }
        edges
    }

    pub fn any(&self) -> bool {
        self.down.iter().any(|down| *down)
    }
}

/// Raw level state of one source for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceSample {
    pub movement: Vec2,
    pub aim: Vec2,
    pub held: ActionStates,
}

/// What the simulation reads for a source in one tick: levels plus rising edges.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceFrame {
    pub movement: Vec2,
    pub aim: Vec2,
    pub held: ActionStates,
    pub pressed: ActionStates,
}

impl SourceFrame {
    pub fn pressed(&self, action: InputAction) -> bool {
        self.pressed.is_down(action)
    }
}
