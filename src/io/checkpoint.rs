//! Binary critic checkpoints for resuming adversarial training.
//!
//! File format (little-endian):
//! ```text
//!   Magic: "ADVREG\0\0"              (8 bytes)
//!   Version: u32                     (4 bytes)
//!   Name length: u32, name: UTF-8
//!   Parameter version: u64          (8 bytes)
//!   Training iteration: u64         (8 bytes)
//!   Architecture length: u32, then that many u32
//!   Parameter count: u64, then that many f32
//! ```
//!
//! Only what resuming needs is stored; optimizer moments are rebuilt.

use crate::critic::{Critic, ParameterSet};
use crate::error::{ReconError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"ADVREG\0\0";
pub const FORMAT_VERSION: u32 = 1;

/// Sanity bound on the variable-length name field.
const MAX_NAME_LEN: u32 = 4096;

#[derive(Clone, Debug, PartialEq)]
pub struct CriticCheckpoint {
    pub name: String,
    pub parameter_version: u64,
    pub iteration: u64,
    pub architecture: Vec<u32>,
    pub values: Vec<f32>,
}

impl CriticCheckpoint {
    pub fn from_critic<C: Critic + ?Sized>(critic: &C, iteration: u64) -> Self {
        let params = critic.parameters();
        Self {
            name: params.name.clone(),
            parameter_version: params.version,
            iteration,
            architecture: critic.architecture(),
            values: params.values.clone(),
        }
    }

    pub fn parameter_set(&self) -> ParameterSet {
        ParameterSet {
            name: self.name.clone(),
            version: self.parameter_version,
            values: self.values.clone(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;

        let name = self.name.as_bytes();
        writer.write_u32::<LittleEndian>(name.len() as u32)?;
        writer.write_all(name)?;

        writer.write_u64::<LittleEndian>(self.parameter_version)?;
        writer.write_u64::<LittleEndian>(self.iteration)?;

        writer.write_u32::<LittleEndian>(self.architecture.len() as u32)?;
        for dim in &self.architecture {
            writer.write_u32::<LittleEndian>(*dim)?;
        }

        writer.write_u64::<LittleEndian>(self.values.len() as u64)?;
        for v in &self.values {
            writer.write_f32::<LittleEndian>(*v)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ReconError::Checkpoint(
                "invalid file magic (not a critic checkpoint)".to_string(),
            ));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(ReconError::Checkpoint(format!(
                "unsupported checkpoint version {version}"
            )));
        }

        let name_len = reader.read_u32::<LittleEndian>()?;
        if name_len > MAX_NAME_LEN {
            return Err(ReconError::Checkpoint(format!(
                "name length {name_len} exceeds {MAX_NAME_LEN}"
            )));
        }
        let mut name = vec![0u8; name_len as usize];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|e| ReconError::Checkpoint(format!("name is not UTF-8: {e}")))?;

        let parameter_version = reader.read_u64::<LittleEndian>()?;
        let iteration = reader.read_u64::<LittleEndian>()?;

        let arch_len = reader.read_u32::<LittleEndian>()?;
        let architecture = (0..arch_len)
            .map(|_| reader.read_u32::<LittleEndian>())
            .collect::<std::io::Result<Vec<_>>>()?;

        let count = reader.read_u64::<LittleEndian>()? as usize;
        let mut values = Vec::new();
        for _ in 0..count {
            values.push(reader.read_f32::<LittleEndian>()?);
        }

        Ok(Self {
            name,
            parameter_version,
            iteration,
            architecture,
            values,
        })
    }
}

/// Where the trainer persists critic parameters.
pub trait CheckpointStore {
    fn save(&self, checkpoint: &CriticCheckpoint) -> Result<()>;

    /// `Ok(None)` when no checkpoint exists yet.
    fn load(&self) -> Result<Option<CriticCheckpoint>>;
}

/// One checkpoint file, replaced atomically on every save.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, checkpoint: &CriticCheckpoint) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        {
            let file = std::fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            checkpoint.write_to(&mut writer)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<CriticCheckpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        CriticCheckpoint::read_from(&mut reader).map(Some)
    }
}
