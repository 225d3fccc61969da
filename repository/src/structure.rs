use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use pool::packed::{read_magnitude, read_string, read_u8, write_packed, write_string};
use pool::{ConstId, ConstantPool, Format, Locator, PoolError};
use version::{ParseVersionError, Version};

/// The first four bytes of every module file, stored big-endian.
pub const FILE_MAGIC: u32 = 0xEC57_A5EE;
pub const FORMAT_MAJOR: u32 = 0;
pub const FORMAT_MINOR: u32 = 20230724;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("not a module file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported module file format {major}.{minor}")]
    UnsupportedFormat { major: u32, minor: u32 },
    #[error("module file has no primary module")]
    NoPrimaryModule,
    #[error("invalid module kind {0}")]
    BadKind(u8),
    #[error("invalid module version: {0}")]
    Version(#[from] ParseVersionError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModuleKind {
    /// A module whose full content lives in the file.
    Primary = 0,
    /// A record of an imported module: its name, version and whatever of its
    /// surface the primary module depends on.
    Fingerprint = 1,
}

impl TryFrom<u8> for ModuleKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ModuleKind::Primary),
            1 => Ok(ModuleKind::Fingerprint),
            other => Err(CodecError::BadKind(other)),
        }
    }
}

/// One module and the constant pool its content refers into.
#[derive(Debug, Clone)]
pub struct ModuleStructure {
    name: String,
    version: Option<Version>,
    kind: ModuleKind,
    imports: Vec<String>,
    pool: ConstantPool,
}

impl ModuleStructure {
    pub fn new(name: &str) -> Self {
        Self::with_kind(name, ModuleKind::Primary)
    }

    pub fn fingerprint(name: &str) -> Self {
        Self::with_kind(name, ModuleKind::Fingerprint)
    }

    fn with_kind(name: &str, kind: ModuleKind) -> Self {
        let mut pool = ConstantPool::new();
        pool.ensure_module(name);
        Self {
            name: name.to_string(),
            version: None,
            kind,
            imports: Vec::new(),
            pool,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.set_version(Some(version));
        self
    }

    pub fn set_version(&mut self, version: Option<Version>) {
        if let Some(ver) = &version {
            self.pool.ensure_version(ver);
        }
        self.version = version;
    }

    pub fn add_import(&mut self, name: &str) {
        if !self.imports.iter().any(|i| i == name) {
            self.pool.ensure_module(name);
            self.imports.push(name.to_string());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn is_fingerprint(&self) -> bool {
        self.kind == ModuleKind::Fingerprint
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// The module constant naming this module in its own pool.
    pub fn identity(&self) -> Option<ConstId> {
        self.pool.find(Format::Module, &Locator::Str(self.name.clone()))
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Whether this module answers to `name` at `version`.
    pub fn is(&self, name: &str, version: Option<&Version>) -> bool {
        self.name == name && self.version.as_ref() == version
    }

    fn write(&mut self, w: &mut dyn Write) -> Result<(), CodecError> {
        w.write_all(&[self.kind as u8])?;
        write_string(w, &self.name)?;
        match &self.version {
            Some(ver) => {
                w.write_all(&[1])?;
                write_string(w, &ver.to_string())?;
            }
            None => w.write_all(&[0])?,
        }
        write_packed(w, self.imports.len() as i64)?;
        for import in &self.imports {
            write_string(w, import)?;
        }
        self.pool.write(w)?;
        Ok(())
    }

    fn read(r: &mut dyn Read) -> Result<Self, CodecError> {
        let kind = ModuleKind::try_from(read_u8(r)?)?;
        let name = read_string(r)?;
        let version = match read_u8(r)? {
            0 => None,
            1 => Some(Version::parse(&read_string(r)?)?),
            _ => return Err(invalid_data("invalid version tag").into()),
        };
        let count = read_magnitude(r)?;
        let imports = (0..count)
            .map(|_| read_string(r))
            .collect::<io::Result<Vec<_>>>()?;
        let pool = ConstantPool::read(r)?;
        Ok(Self {
            name,
            version,
            kind,
            imports,
            pool,
        })
    }
}

/// The content of one module file.
#[derive(Debug, Clone, Default)]
pub struct FileStructure {
    modules: Vec<ModuleStructure>,
}

impl FileStructure {
    pub fn new(main: ModuleStructure) -> Self {
        Self { modules: vec![main] }
    }

    pub fn add_module(&mut self, module: ModuleStructure) {
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[ModuleStructure] {
        &self.modules
    }

    /// The first primary module.
    pub fn main_module(&self) -> Option<&ModuleStructure> {
        self.modules.iter().find(|m| !m.is_fingerprint())
    }

    /// Modules with content, skipping fingerprints.
    pub fn primary_modules(&self) -> impl Iterator<Item = &ModuleStructure> {
        self.modules.iter().filter(|m| !m.is_fingerprint())
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.primary_modules().map(ModuleStructure::name).collect()
    }

    pub fn module(&self, name: &str) -> Option<&ModuleStructure> {
        self.primary_modules().find(|m| m.name() == name)
    }

    pub fn fingerprint(&self, name: &str) -> Option<&ModuleStructure> {
        self.modules
            .iter()
            .find(|m| m.is_fingerprint() && m.name() == name)
    }

    /// An independent copy, pools included.
    pub fn deep_copy(&self) -> FileStructure {
        self.clone()
    }

    pub fn write(&mut self, w: &mut dyn Write) -> Result<(), CodecError> {
        if self.main_module().is_none() {
            return Err(CodecError::NoPrimaryModule);
        }
        write_u32(w, FILE_MAGIC)?;
        write_u32(w, FORMAT_MAJOR)?;
        write_u32(w, FORMAT_MINOR)?;
        write_packed(w, self.modules.len() as i64)?;
        for module in &mut self.modules {
            module.write(w)?;
        }
        Ok(())
    }

    pub fn read(r: &mut dyn Read) -> Result<Self, CodecError> {
        let magic = read_u32(r)?;
        if magic != FILE_MAGIC {
            return Err(CodecError::BadMagic(magic));
        }
        let major = read_u32(r)?;
        let minor = read_u32(r)?;
        if major != FORMAT_MAJOR || minor > FORMAT_MINOR {
            return Err(CodecError::UnsupportedFormat { major, minor });
        }
        let count = read_magnitude(r)?;
        let modules = (0..count)
            .map(|_| ModuleStructure::read(r))
            .collect::<Result<Vec<_>, _>>()?;
        let file = Self { modules };
        if file.main_module().is_none() {
            return Err(CodecError::NoPrimaryModule);
        }
        Ok(file)
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::read(&mut &bytes[..])
    }

    pub fn read_file(path: &Path) -> Result<Self, CodecError> {
        let mut r = BufReader::new(File::open(path)?);
        Self::read(&mut r)
    }

    pub fn write_file(&mut self, path: &Path) -> Result<(), CodecError> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write(&mut w)?;
        w.flush()?;
        Ok(())
    }
}

fn write_u32(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

fn read_u32(r: &mut dyn Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
