//! Stream layer: raw sources, BGZF decompression, compression sniffing

pub mod bgzf;
pub mod source;
pub mod stream;

pub use bgzf::{BgzfReader, Chunk, VirtualOffset};
pub use source::{RawSource, MMAP_THRESHOLD};
pub use stream::ByteStream;
