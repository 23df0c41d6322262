//! Image codec work — pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Convert** file → file | `image` decoders + per-format encoders |
//! | **Re-encode** bytes for a target name | same, passthrough for PNG |
//! | **Placeholder** | SVG drawn in code, rasterized by `resvg` / `tiny-skia` |
//!
//! The module is split into:
//! - **Parameters**: [`Quality`] and [`TargetFormat`]
//! - **Codec**: [`ImageCodec`] trait + [`RustCodec`]
//! - **Placeholder**: fallback card synthesis and detection

pub mod codec;
mod params;
pub mod placeholder;
pub mod rust_codec;

pub use codec::{CodecError, ImageCodec};
pub use params::{Quality, TargetFormat};
pub use placeholder::{PlaceholderError, is_placeholder, render_placeholder};
pub use rust_codec::RustCodec;
