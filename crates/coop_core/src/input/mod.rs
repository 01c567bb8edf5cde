mod actions;
mod devices;
mod registry;

pub use actions::{ActionStates, InputAction, SourceFrame, SourceSample};
pub use devices::{
    GamepadButton, GamepadState, KeyCode, KeyScheme, KeySchemeId, KeyboardState,
    BUILTIN_KEY_SCHEMES,
};
pub use registry::{
    BindError, InputSourceRegistry, ReleasedBinding, SourceCapabilities, SourceDescriptor,
    SourceKind, UnbindOutcome,
};
