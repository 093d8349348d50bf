//! Compute kernel artifacts.
//!
//! Kernels arrive as SPIR-V word streams, either as raw little-endian `.spv`
//! files or as a textual dump of decimal words separated by arbitrary
//! non-digit characters (the `.cinit` form emitted by `spirv-as`/`xxd`
//! pipelines).

use std::path::{Path, PathBuf};

use crate::error::{ProbeError, Result};

/// SPIR-V magic number.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Words in a SPIR-V module header.
const HEADER_WORDS: usize = 5;

/// `OpExecutionMode` opcode.
const OP_EXECUTION_MODE: u32 = 16;

/// `LocalSize` execution mode.
const MODE_LOCAL_SIZE: u32 = 17;

/// Default artifact of the relaxed fetch-add contention kernel.
pub const CONTENTION_KERNEL_FILE: &str = "atomic_fa_relaxed.cinit";

/// Default artifact of the occupancy discovery kernel.
pub const OCCUPANCY_KERNEL_FILE: &str = "occupancy_discovery.cinit";

/// A loaded SPIR-V module plus the entry point to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBinary {
    words: Vec<u32>,
    entry_point: String,
}

impl KernelBinary {
    /// Wrap an in-memory word stream.
    pub fn from_words(words: Vec<u32>, entry_point: impl Into<String>) -> Result<Self> {
        match words.first() {
            Some(&SPIRV_MAGIC) => {}
            Some(&other) => {
                return Err(ProbeError::InvalidKernel(format!(
                    "bad magic word {:#010x}",
                    other
                )))
            }
            None => return Err(ProbeError::InvalidKernel("empty module".to_string())),
        }
        if words.len() < HEADER_WORDS {
            return Err(ProbeError::InvalidKernel(format!(
                "module has {} words, header needs {}",
                words.len(),
                HEADER_WORDS
            )));
        }
        Ok(Self {
            words,
            entry_point: entry_point.into(),
        })
    }

    /// Parse the textual encoding: every maximal run of ASCII digits is one
    /// decimal word, everything else is a separator.
    pub fn from_text(text: &str, entry_point: impl Into<String>) -> Result<Self> {
        Self::from_words(parse_decimal_words(text)?, entry_point)
    }

    /// Reinterpret raw little-endian bytes as words.
    pub fn from_spirv_bytes(bytes: &[u8], entry_point: impl Into<String>) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(ProbeError::InvalidKernel(format!(
                "binary length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::from_words(words, entry_point)
    }

    /// Load an artifact from disk, sniffing binary vs. textual encoding.
    pub fn load(path: impl AsRef<Path>, entry_point: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;

        let kernel = if bytes.len() >= 4 && bytes[..4] == SPIRV_MAGIC.to_le_bytes() {
            Self::from_spirv_bytes(&bytes, entry_point)?
        } else {
            let text = String::from_utf8_lossy(&bytes);
            Self::from_text(&text, entry_point)?
        };

        tracing::debug!(
            path = %path.display(),
            words = kernel.words.len(),
            entry = %kernel.entry_point,
            "loaded kernel"
        );
        Ok(kernel)
    }

    /// SPIR-V words.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Entry point name.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Declared `LocalSize` of the entry point's execution mode, if any.
    pub fn local_size(&self) -> Option<(u32, u32, u32)> {
        self.local_size_offset()
            .map(|at| (self.words[at], self.words[at + 1], self.words[at + 2]))
    }

    /// Copy of this module with the x dimension of `LocalSize` rewritten.
    ///
    /// Modules that size their workgroup through specialization constants or
    /// `LocalSizeId` carry no literal to patch and are returned unchanged.
    pub fn with_workgroup_size(&self, x: u32) -> Self {
        let mut patched = self.clone();
        if let Some(at) = patched.local_size_offset() {
            patched.words[at] = x;
        } else {
            tracing::warn!(
                entry = %self.entry_point,
                "kernel has no literal LocalSize; workgroup size left to the module"
            );
        }
        patched
    }

    /// Offset of the `LocalSize` x literal.
    fn local_size_offset(&self) -> Option<usize> {
        let mut at = HEADER_WORDS;
        while at < self.words.len() {
            let word = self.words[at];
            let count = (word >> 16) as usize;
            let opcode = word & 0xffff;
            if count == 0 || at + count > self.words.len() {
                return None;
            }
            if opcode == OP_EXECUTION_MODE && count >= 6 && self.words[at + 2] == MODE_LOCAL_SIZE
            {
                return Some(at + 3);
            }
            at += count;
        }
        None
    }
}

/// Extract decimal words in order from arbitrary text.
pub fn parse_decimal_words(text: &str) -> Result<Vec<u32>> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse::<u32>().map_err(|_| {
                ProbeError::InvalidKernel(format!("token '{}' does not fit in 32 bits", token))
            })
        })
        .collect()
}

/// The kernels a benchmark run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct KernelSet {
    /// RMW loop kernel.
    pub contention: KernelBinary,
    /// Ticket-lock occupancy kernel; only needed when discovering occupancy.
    pub occupancy: Option<KernelBinary>,
}

impl KernelSet {
    /// Entry point of the contention kernel.
    pub const CONTENTION_ENTRY: &'static str = "rmw_test";
    /// Entry point of the occupancy kernel.
    pub const OCCUPANCY_ENTRY: &'static str = "occupancy_discovery";

    /// Load both default artifacts from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            contention: KernelBinary::load(
                dir.join(CONTENTION_KERNEL_FILE),
                Self::CONTENTION_ENTRY,
            )?,
            occupancy: Some(KernelBinary::load(
                dir.join(OCCUPANCY_KERNEL_FILE),
                Self::OCCUPANCY_ENTRY,
            )?),
        })
    }

    /// Load only the contention kernel from `dir`.
    pub fn load_contention_only(dir: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = dir.as_ref().join(CONTENTION_KERNEL_FILE);
        Ok(Self {
            contention: KernelBinary::load(path, Self::CONTENTION_ENTRY)?,
            occupancy: None,
        })
    }
}
