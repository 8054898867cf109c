//! Block-wise stream churn
//!
//! The container produced by an encryption is:
//!
//! ```text
//! [c_1][c_2]...[c_n][t_1][t_2]...[t_n][pepper: 32 bytes]   (tag trailer)
//! [c_1][c_2]...[c_n][pepper: 32 bytes]                     (tags in a side stream)
//! ```
//!
//! Every `c_i` is as long as the plaintext block it came from (the last one
//! may be short), every `t_i` is 16 bytes. Block `i` is sealed under the
//! nonce obtained by incrementing a 12-byte little-endian counter `i` times
//! from zero, so the first block uses nonce 1.
//!
//! Blocks are processed strictly in order. The engine never opens, closes or
//! deletes anything; it only reads, writes and seeks the streams it is handed.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::SpooledTempFile;
use tracing::{debug, trace};

use crate::backend::{Backend, BackendKind, BlockCipher, NONCE_LEN, TAG_LEN, Tag};
use crate::counter::{Counter, Endianness};
use crate::derive::{PEPPER_LEN, Pepper, Salt, derive_key};
use crate::error::{ChurnError, ErrorCategory, ErrorKind, Result};

/// Default plaintext block size (32 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

/// Nonce counters are little-endian regardless of host so containers are portable.
pub const COUNTER_ENDIANNESS: Endianness = Endianness::Little;

/// Tags beyond this many bytes are spooled to disk while encrypting.
const TRAILER_SPOOL_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChurnDirection {
    Decrypt,
    Encrypt,
}

/// Whether tags are checked on decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verification {
    #[default]
    Verify,
    /// Decrypt through the keystream only; tags are neither read nor checked.
    Skip,
}

/// A stream tags are written to (encrypt) or read from (decrypt).
pub trait TagStream: Read + Write {}

impl<T: Read + Write + ?Sized> TagStream for T {}

/// Where the per-block tags live.
#[derive(Default)]
pub enum TagRoute<'a> {
    /// Batched after the last ciphertext block, before the pepper.
    #[default]
    Trailer,
    /// One tag per block, in block order, in a caller-owned stream.
    Stream(&'a mut dyn TagStream),
    /// Tags live outside the container and are not consulted. Only valid
    /// when decrypting with [`Verification::Skip`].
    Detached,
}

impl TagRoute<'_> {
    fn name(&self) -> &'static str {
        match self {
            TagRoute::Trailer => "trailer",
            TagRoute::Stream(_) => "stream",
            TagRoute::Detached => "detached",
        }
    }
}

pub struct ChurnOptions<'a> {
    pub block_size: usize,
    pub tag_route: TagRoute<'a>,
    pub verification: Verification,
}

impl Default for ChurnOptions<'_> {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            tag_route: TagRoute::Trailer,
            verification: Verification::Verify,
        }
    }
}

impl<'a> ChurnOptions<'a> {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_tag_stream(mut self, tags: &'a mut dyn TagStream) -> Self {
        self.tag_route = TagRoute::Stream(tags);
        self
    }

    pub fn with_detached_tags(mut self) -> Self {
        self.tag_route = TagRoute::Detached;
        self
    }

    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }
}

/// What a churn processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChurnSummary {
    /// Number of blocks sealed or opened.
    pub blocks: u64,
    /// Plaintext bytes processed.
    pub payload_bytes: u64,
}

/// Encrypts or decrypts `source` into `target`.
///
/// `target` must be empty; it is left positioned at its start. On encrypt a
/// fresh pepper is generated and appended; on decrypt it is read back from
/// the end of `source`. The backend built for this call, and the key inside
/// it, are dropped before returning on every path.
pub fn churn<R, W>(
    source: &mut R,
    target: &mut W,
    direction: ChurnDirection,
    backend: BackendKind,
    secret: &[u8],
    salt: &Salt,
    options: ChurnOptions<'_>,
) -> Result<ChurnSummary>
where
    R: Read + Seek,
    W: Write + Seek,
{
    check_block_size(options.block_size, backend)?;

    match direction {
        ChurnDirection::Encrypt => {
            let pepper = Pepper::generate();
            let cipher = Backend::new(backend, &derive_key(secret, salt, &pepper));
            encrypt_blocks(&cipher, source, target, &pepper, options)
        }
        ChurnDirection::Decrypt => {
            let pepper = read_pepper(source)?;
            let cipher = Backend::new(backend, &derive_key(secret, salt, &pepper));
            decrypt_blocks(&cipher, source, target, options)
        }
    }
}

/// Reads the pepper stored in the last 32 bytes of a container and rewinds.
pub fn read_pepper<R: Read + Seek>(source: &mut R) -> Result<Pepper> {
    let total = stream_len(source, "source")?;
    if total < PEPPER_LEN as u64 {
        return Err(ChurnError::invalid_argument(format!(
            "Stream not readable: {} bytes is shorter than the {} byte pepper",
            total, PEPPER_LEN
        )));
    }

    let mut bytes = [0u8; PEPPER_LEN];
    source
        .seek(SeekFrom::End(-(PEPPER_LEN as i64)))
        .and_then(|_| source.read_exact(&mut bytes))
        .and_then(|_| source.seek(SeekFrom::Start(0)))
        .map_err(|e| ChurnError::stream("failed to read pepper", e))?;
    Ok(Pepper::from_bytes(bytes))
}

/// Seals every block of `source` with `cipher`, then writes the tag trailer
/// (if tags are not routed to a stream) and `pepper`.
pub fn encrypt_blocks<C, R, W>(
    cipher: &C,
    source: &mut R,
    target: &mut W,
    pepper: &Pepper,
    mut options: ChurnOptions<'_>,
) -> Result<ChurnSummary>
where
    C: BlockCipher + ?Sized,
    R: Read + Seek,
    W: Write + Seek,
{
    check_nonzero_block(options.block_size)?;
    if matches!(options.tag_route, TagRoute::Detached) {
        return Err(ChurnError::invalid_argument(
            "encryption needs a tag trailer or tag stream",
        ));
    }
    check_target(target)?;
    source
        .seek(SeekFrom::Start(0))
        .map_err(|e| ChurnError::stream("failed to rewind source", e))?;

    debug!(
        block_size = options.block_size,
        tags = options.tag_route.name(),
        "encrypting stream"
    );

    let mut trailer = match options.tag_route {
        TagRoute::Trailer => Some(SpooledTempFile::new(TRAILER_SPOOL_LIMIT)),
        TagRoute::Stream(_) | TagRoute::Detached => None,
    };
    let mut counter = Counter::new(NONCE_LEN, COUNTER_ENDIANNESS);
    let mut buffer = vec![0u8; options.block_size];
    let mut summary = ChurnSummary {
        blocks: 0,
        payload_bytes: 0,
    };

    loop {
        let block = summary.blocks + 1;
        let read = read_full(source, &mut buffer)
            .map_err(|e| ChurnError::stream(format!("failed to read block {}", block), e))?;
        if read == 0 {
            break;
        }

        counter.increment();
        let (ciphertext, tag) = cipher
            .encrypt_block(&buffer[..read], counter.as_bytes())
            .map_err(|e| e.with_context(format!("failed to encrypt block {}", block)))?;
        target
            .write_all(&ciphertext)
            .map_err(|e| ChurnError::stream(format!("failed to write block {}", block), e))?;

        let routed = match (&mut options.tag_route, trailer.as_mut()) {
            (TagRoute::Stream(tags), _) => tags.write_all(&tag),
            (TagRoute::Trailer, Some(spool)) => spool.write_all(&tag),
            (TagRoute::Trailer, None) | (TagRoute::Detached, _) => {
                Err(io::Error::other("no tag destination"))
            }
        };
        routed.map_err(|e| {
            ChurnError::stream(format!("failed to write tag for block {}", block), e)
        })?;

        trace!(block, len = read, "sealed block");
        summary.blocks = block;
        summary.payload_bytes += read as u64;

        if read < buffer.len() {
            break;
        }
    }

    if let Some(mut spool) = trailer {
        spool
            .seek(SeekFrom::Start(0))
            .and_then(|_| io::copy(&mut spool, target))
            .map_err(|e| ChurnError::stream("failed to write tag trailer", e))?;
    }
    if let TagRoute::Stream(tags) = &mut options.tag_route {
        tags.flush()
            .map_err(|e| ChurnError::stream("failed to flush tag stream", e))?;
    }

    target
        .write_all(pepper.as_bytes())
        .and_then(|_| target.flush())
        .and_then(|_| target.seek(SeekFrom::Start(0)))
        .map_err(|e| ChurnError::stream("failed to finish target", e))?;

    debug!(
        blocks = summary.blocks,
        bytes = summary.payload_bytes,
        "encrypted stream"
    );
    Ok(summary)
}

/// Opens every block of a container produced by [`encrypt_blocks`] with the
/// same block size and tag route.
pub fn decrypt_blocks<C, R, W>(
    cipher: &C,
    source: &mut R,
    target: &mut W,
    mut options: ChurnOptions<'_>,
) -> Result<ChurnSummary>
where
    C: BlockCipher + ?Sized,
    R: Read + Seek,
    W: Write + Seek,
{
    check_nonzero_block(options.block_size)?;
    if matches!(options.tag_route, TagRoute::Detached)
        && options.verification == Verification::Verify
    {
        return Err(ChurnError::invalid_argument(
            "verification needs a tag trailer or tag stream",
        ));
    }
    check_target(target)?;

    let total = stream_len(source, "source")?;
    let layout = Layout::of(total, options.block_size, &options.tag_route)?;

    debug!(
        blocks = layout.blocks,
        block_size = options.block_size,
        tags = options.tag_route.name(),
        verification = ?options.verification,
        "decrypting stream"
    );

    let block_size = options.block_size as u64;
    let mut counter = Counter::new(NONCE_LEN, COUNTER_ENDIANNESS);
    let mut buffer = vec![0u8; options.block_size];
    let mut tag: Tag = [0u8; TAG_LEN];

    for index in 0..layout.blocks {
        let block = index + 1;
        let offset = index * block_size;
        let len = (layout.ciphertext_len - offset).min(block_size) as usize;

        counter.increment();
        source
            .seek(SeekFrom::Start(offset))
            .and_then(|_| source.read_exact(&mut buffer[..len]))
            .map_err(|e| ChurnError::stream(format!("failed to read block {}", block), e))?;

        let plaintext = match options.verification {
            Verification::Skip => cipher.authless_decrypt_block(&buffer[..len], counter.as_bytes()),
            Verification::Verify => {
                let read = match &mut options.tag_route {
                    TagRoute::Trailer => source
                        .seek(SeekFrom::Start(layout.ciphertext_len + index * TAG_LEN as u64))
                        .and_then(|_| source.read_exact(&mut tag)),
                    TagRoute::Stream(tags) => tags.read_exact(&mut tag),
                    TagRoute::Detached => Err(io::Error::other("tags are detached")),
                };
                read.map_err(|e| {
                    ChurnError::stream(format!("failed to read tag for block {}", block), e)
                })?;
                cipher.decrypt_block(&buffer[..len], &tag, counter.as_bytes())
            }
        }
        .map_err(|e| e.with_context(format!("failed to decrypt block {}", block)))?;

        target
            .write_all(&plaintext)
            .map_err(|e| ChurnError::stream(format!("failed to write block {}", block), e))?;
        trace!(block, len, "opened block");
    }

    target
        .flush()
        .and_then(|_| target.seek(SeekFrom::Start(0)))
        .map_err(|e| ChurnError::stream("failed to finish target", e))?;

    debug!(blocks = layout.blocks, "decrypted stream");
    Ok(ChurnSummary {
        blocks: layout.blocks,
        payload_bytes: layout.ciphertext_len,
    })
}

/// Block geometry of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    blocks: u64,
    ciphertext_len: u64,
}

impl Layout {
    fn of(total: u64, block_size: usize, route: &TagRoute<'_>) -> Result<Self> {
        let payload = total.checked_sub(PEPPER_LEN as u64).ok_or_else(|| {
            ChurnError::invalid_argument(format!(
                "Stream not readable: {} bytes is shorter than the {} byte pepper",
                total, PEPPER_LEN
            ))
        })?;
        let block_size = block_size as u64;
        let tag_len = TAG_LEN as u64;

        match route {
            TagRoute::Stream(_) | TagRoute::Detached => Ok(Self {
                blocks: payload.div_ceil(block_size),
                ciphertext_len: payload,
            }),
            TagRoute::Trailer => {
                let blocks = payload.div_ceil(block_size + tag_len);
                let ciphertext_len = payload
                    .checked_sub(blocks * tag_len)
                    .filter(|len| len.div_ceil(block_size) == blocks)
                    .ok_or_else(|| {
                        ChurnError::with_kind(
                            ErrorCategory::User,
                            ErrorKind::TruncatedInput,
                            format!(
                                "{} payload bytes do not form whole blocks with a tag trailer",
                                payload
                            ),
                        )
                    })?;
                Ok(Self {
                    blocks,
                    ciphertext_len,
                })
            }
        }
    }
}

fn check_nonzero_block(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(ChurnError::invalid_argument("block size must be positive"));
    }
    Ok(())
}

fn check_block_size(block_size: usize, backend: BackendKind) -> Result<()> {
    check_nonzero_block(block_size)?;
    if block_size as u64 > backend.max_block_len() {
        return Err(ChurnError::with_kind(
            ErrorCategory::User,
            ErrorKind::UnsupportedConfiguration,
            format!(
                "{} cannot seal {} byte blocks (limit {})",
                backend,
                block_size,
                backend.max_block_len()
            ),
        ));
    }
    Ok(())
}

fn check_target<W: Seek>(target: &mut W) -> Result<()> {
    let len = stream_len(target, "target")?;
    if len != 0 {
        return Err(ChurnError::invalid_argument(format!(
            "Stream not writeable: target already holds {} bytes",
            len
        )));
    }
    Ok(())
}

/// Length of a seekable stream; leaves it positioned at the start.
fn stream_len<S: Seek + ?Sized>(stream: &mut S, name: &str) -> Result<u64> {
    stream
        .seek(SeekFrom::End(0))
        .and_then(|len| stream.seek(SeekFrom::Start(0)).map(|_| len))
        .map_err(|e| {
            ChurnError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::InvalidArgument,
                format!("{} stream is not seekable", name),
                e,
            )
        })
}

/// Fills `buf` unless the stream ends first; returns the bytes read.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
