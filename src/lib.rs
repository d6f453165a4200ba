// container for the blender executable - version probe, render launch, project peek
pub mod blender;

// scans render output lines for frame boundary markers
pub mod parser;

// per-frame duration history and time estimates
pub mod timing;

// terminates the render process tree with a grace period
pub mod process;

// state machine owning one render job from start to finish
pub mod session;

// per-project settings file keyed by blend file path
pub mod settings;

pub mod models;
