//! Rigify character export: skeleton reduction, weight-group fixes and
//! Multires shape-key baking over an abstract host scene.

pub mod logging;

pub mod armature;
pub mod convert;
pub mod error;
pub mod mesh;
pub mod modifier;
pub mod project;
pub mod scene;
pub mod subdivide;

pub use convert::{ConversionReport, convert_character, convert_character_with_progress};
pub use error::{ConvertError, EntityKind};
pub use project::ProjectSettings;
pub use scene::{MemoryScene, SceneHost};
