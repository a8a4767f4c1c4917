mod args;

pub use args::{Args, CompressionLevel, RendererKind};
