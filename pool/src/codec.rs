use std::io::{Read, Write};

use log::debug;
use version::Version;

use crate::constant::{ConstId, Constant};
use crate::format::Format;
use crate::packed::{read_magnitude, read_packed, read_string, read_u8, write_packed, write_string};
use crate::pool::{ConstantPool, Entry, PoolError, State};

impl ConstantPool {
    /// Lay out every interned constant in the pool's total order, assign
    /// positions, and write the table.
    ///
    /// Two pools with the same logical content produce identical bytes no
    /// matter in which order their constants were registered.
    pub fn write(&mut self, w: &mut dyn Write) -> Result<(), PoolError> {
        let held = self
            .entries
            .iter()
            .position(|e| e.state == State::Held && !matches!(e.constant, Constant::UnresolvedName(_)));
        if let Some(index) = held {
            return Err(PoolError::Unresolved(self.describe(ConstId(index as u32))));
        }

        let mut order: Vec<ConstId> = (0..self.entries.len() as u32)
            .map(ConstId)
            .filter(|id| self.entries[id.index()].state == State::Interned)
            .collect();
        order.sort_by(|&a, &b| self.compare(a, b));

        for entry in &mut self.entries {
            entry.position = None;
        }
        for (position, id) in order.iter().enumerate() {
            self.entries[id.index()].position = Some(position as u32);
        }
        self.by_position = order;
        debug!("assembled constant pool with {} constants", self.by_position.len());

        write_packed(w, self.by_position.len() as i64)?;
        for &id in &self.by_position {
            self.write_constant(w, id)?;
        }
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, PoolError> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }

    fn write_ref(&self, w: &mut dyn Write, id: ConstId) -> Result<(), PoolError> {
        let position = self
            .position(id)
            .ok_or_else(|| PoolError::Unresolved(self.describe(id)))?;
        write_packed(w, position as i64)?;
        Ok(())
    }

    fn write_refs(&self, w: &mut dyn Write, ids: &[ConstId]) -> Result<(), PoolError> {
        write_packed(w, ids.len() as i64)?;
        for &id in ids {
            self.write_ref(w, id)?;
        }
        Ok(())
    }

    fn write_constant(&self, w: &mut dyn Write, id: ConstId) -> Result<(), PoolError> {
        let constant = self.get(id);
        w.write_all(&[constant.format() as u8])?;
        match constant {
            Constant::Int64(v) => write_packed(w, *v)?,
            Constant::UInt8(v) => w.write_all(&[*v])?,
            Constant::Float32(bits) => w.write_all(&bits.to_be_bytes())?,
            Constant::Float64(bits) => w.write_all(&bits.to_be_bytes())?,
            Constant::Char(ch) => write_packed(w, *ch as i64)?,
            Constant::String(s)
            | Constant::Module(s)
            | Constant::ConditionNamed(s)
            | Constant::UnresolvedName(s) => write_string(w, s)?,
            Constant::Version(ver) => write_string(w, ver.literal())?,
            Constant::Array(ids) | Constant::ConditionAll(ids) | Constant::ConditionAny(ids) => {
                self.write_refs(w, ids)?
            }
            Constant::Package { parent, name }
            | Constant::Class { parent, name }
            | Constant::Typedef { parent, name }
            | Constant::Property { parent, name }
            | Constant::MultiMethod { parent, name } => {
                self.write_ref(w, *parent)?;
                write_string(w, name)?;
            }
            Constant::Method {
                parent,
                name,
                params,
                returns,
            } => {
                self.write_ref(w, *parent)?;
                write_string(w, name)?;
                self.write_refs(w, params)?;
                self.write_refs(w, returns)?;
            }
            Constant::Annotation { class, params } => {
                self.write_ref(w, *class)?;
                self.write_refs(w, params)?;
            }
            Constant::TerminalType(id)
            | Constant::ConditionNot(id)
            | Constant::ConditionPresent(id)
            | Constant::ConditionVersioned(id) => self.write_ref(w, *id)?,
            Constant::AnnotatedType { annotation: a, ty: b }
            | Constant::ConditionVersionMatches { module: a, version: b } => {
                self.write_ref(w, *a)?;
                self.write_ref(w, *b)?;
            }
        }
        Ok(())
    }

    /// Read a table written by [`write`](Self::write).
    ///
    /// The first phase reads every constant with its references left as raw
    /// positions; the second checks the references, rejects cycles, and
    /// rebuilds the intern tables.
    pub fn read(r: &mut dyn Read) -> Result<ConstantPool, PoolError> {
        let count = read_magnitude(r)? as usize;
        let mut raw = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            raw.push(read_constant(r)?);
        }

        for (index, constant) in raw.iter().enumerate() {
            if let Some(bad) = constant.children().into_iter().find(|c| c.index() >= count) {
                return Err(PoolError::Corrupt(format!(
                    "constant {index} refers to position {} of {count}",
                    bad.index()
                )));
            }
        }
        let mut marks = vec![Mark::Unvisited; count];
        for index in 0..count {
            check_acyclic(&raw, index, &mut marks)?;
        }

        let mut pool = ConstantPool::new();
        for (index, constant) in raw.into_iter().enumerate() {
            let id = ConstId(index as u32);
            if let Some(locator) = constant.locator() {
                if pool.locators.insert((constant.format(), locator), id).is_some() {
                    return Err(PoolError::Corrupt(format!("constant {index} is a duplicate")));
                }
            }
            if pool.lookup.insert(constant.clone(), id).is_some() {
                return Err(PoolError::Corrupt(format!("constant {index} is a duplicate")));
            }
            pool.entries.push(Entry {
                constant,
                position: Some(index as u32),
                state: State::Interned,
            });
            pool.by_position.push(id);
        }
        debug!("read constant pool with {count} constants");
        Ok(pool)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ConstantPool, PoolError> {
        Self::read(&mut &bytes[..])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

fn check_acyclic(raw: &[Constant], index: usize, marks: &mut [Mark]) -> Result<(), PoolError> {
    match marks[index] {
        Mark::Done => Ok(()),
        Mark::Visiting => Err(PoolError::Corrupt(format!("constant {index} refers to itself"))),
        Mark::Unvisited => {
            marks[index] = Mark::Visiting;
            for child in raw[index].children() {
                check_acyclic(raw, child.index(), marks)?;
            }
            marks[index] = Mark::Done;
            Ok(())
        }
    }
}

fn read_ref(r: &mut dyn Read) -> Result<ConstId, PoolError> {
    Ok(ConstId(read_magnitude(r)?))
}

fn read_refs(r: &mut dyn Read) -> Result<Vec<ConstId>, PoolError> {
    let count = read_magnitude(r)?;
    (0..count).map(|_| read_ref(r)).collect()
}

fn read_constant(r: &mut dyn Read) -> Result<Constant, PoolError> {
    let byte = read_u8(r)?;
    let format = Format::try_from(byte)
        .map_err(|b| PoolError::Corrupt(format!("unknown constant format 0x{b:02x}")))?;
    let constant = match format {
        Format::Int64 => Constant::Int64(read_packed(r)?),
        Format::UInt8 => Constant::UInt8(read_u8(r)?),
        Format::Float32 => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Constant::Float32(u32::from_be_bytes(buf))
        }
        Format::Float64 => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            Constant::Float64(u64::from_be_bytes(buf))
        }
        Format::Char => {
            let code = read_magnitude(r)?;
            let ch = char::from_u32(code)
                .ok_or_else(|| PoolError::Corrupt(format!("invalid char U+{code:X}")))?;
            Constant::Char(ch)
        }
        Format::String => Constant::String(read_string(r)?),
        Format::Version => {
            let literal = read_string(r)?;
            let ver = Version::parse(&literal).map_err(|e| PoolError::Corrupt(e.to_string()))?;
            Constant::Version(ver)
        }
        Format::Array => Constant::Array(read_refs(r)?),
        Format::Module => Constant::Module(read_string(r)?),
        Format::Package | Format::Class | Format::Typedef | Format::Property | Format::MultiMethod => {
            let parent = read_ref(r)?;
            let name = read_string(r)?;
            match format {
                Format::Package => Constant::Package { parent, name },
                Format::Class => Constant::Class { parent, name },
                Format::Typedef => Constant::Typedef { parent, name },
                Format::Property => Constant::Property { parent, name },
                _ => Constant::MultiMethod { parent, name },
            }
        }
        Format::Method => Constant::Method {
            parent: read_ref(r)?,
            name: read_string(r)?,
            params: read_refs(r)?,
            returns: read_refs(r)?,
        },
        Format::Annotation => Constant::Annotation {
            class: read_ref(r)?,
            params: read_refs(r)?,
        },
        Format::UnresolvedName => {
            return Err(PoolError::Corrupt("serialized unresolved name".to_string()));
        }
        Format::TerminalType => Constant::TerminalType(read_ref(r)?),
        Format::AnnotatedType => Constant::AnnotatedType {
            annotation: read_ref(r)?,
            ty: read_ref(r)?,
        },
        Format::ConditionNot => Constant::ConditionNot(read_ref(r)?),
        Format::ConditionAll | Format::ConditionAny => {
            let ids = read_refs(r)?;
            if !(2..=63).contains(&ids.len()) {
                return Err(PoolError::Corrupt(format!("{} conditions in {format:?}", ids.len())));
            }
            if format == Format::ConditionAll {
                Constant::ConditionAll(ids)
            } else {
                Constant::ConditionAny(ids)
            }
        }
        Format::ConditionNamed => Constant::ConditionNamed(read_string(r)?),
        Format::ConditionPresent => Constant::ConditionPresent(read_ref(r)?),
        Format::ConditionVersionMatches => Constant::ConditionVersionMatches {
            module: read_ref(r)?,
            version: read_ref(r)?,
        },
        Format::ConditionVersioned => Constant::ConditionVersioned(read_ref(r)?),
    };
    Ok(constant)
}
