// Diff codec: delta encoding between serialized resource texts.
//
// # Modules
//
// - `codec`  — line-based edit scripts, size/time guards, apply with
//              drift verification
// - `render` — display-only unified diff with collapsed context

pub mod codec;
pub mod render;

// Re-export key types for convenience.
pub use codec::{Delta, DiffLimits, Edit, decode, encode};
pub use render::render;
