/// Unit of work flowing through the pipeline.
///
/// `id` is the only ordering key: the reader assigns ids in file order and
/// both queues refuse to admit a block before all smaller ids. `content` is
/// raw bytes on the compress input side and codec payload on the decompress
/// input side; workers swap one for the other and keep the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: u64,
    content: Vec<u8>,
    raw_size: usize,
    compressed_size: usize,
}

impl Block {
    /// A block of uncompressed bytes. `compressed_size` stays 0 until a
    /// worker compresses it.
    pub fn raw(id: u64, content: Vec<u8>) -> Self {
        let raw_size = content.len();
        Self {
            id,
            content,
            raw_size,
            compressed_size: 0,
        }
    }

    /// A block of codec payload that decompresses to `raw_size` bytes.
    pub fn compressed(id: u64, content: Vec<u8>, raw_size: usize) -> Self {
        let compressed_size = content.len();
        Self {
            id,
            content,
            raw_size,
            compressed_size,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    #[inline]
    pub fn raw_size(&self) -> usize {
        self.raw_size
    }

    #[inline]
    pub fn compressed_size(&self) -> usize {
        self.compressed_size
    }

    /// Bytes this block occupies in a queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
