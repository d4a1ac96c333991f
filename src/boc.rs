//! Cell tree model and bag-of-cells (de)serialization.
//!
//! Account state arrives from the network as a serialized bag of cells: a
//! header describing cell/root counts followed by each cell's descriptor
//! bytes, payload and forward reference indices. By protocol convention the
//! state root's first reference is the contract code and the second is its
//! persistent storage.

use alloy_primitives::U256;
use std::sync::Arc;
use thiserror::Error;

pub const BOC_MAGIC: u32 = 0xb5ee9c72;
pub const MAX_REFS: usize = 4;
pub const MAX_DATA_BYTES: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("state blob is empty")]
    Empty,
    #[error("bad bag-of-cells magic: {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported bag-of-cells flags: {0:#04x}")]
    UnsupportedFlags(u8),
    #[error("blob truncated")]
    Truncated,
    #[error("cell {index} has malformed descriptors")]
    BadDescriptor { index: usize },
    #[error("cell {index} reference {reference} is out of order")]
    BadReference { index: usize, reference: usize },
    #[error("no root cells declared")]
    NoRoots,
    #[error("cell data exceeds 1023 bits")]
    OversizedData,
    #[error("cell has more than {MAX_REFS} references")]
    TooManyRefs,
    #[error("account state root has {found} references, need code and storage")]
    MissingStateRefs { found: usize },
}

/// A node in the state tree: up to 1023 bits of payload and up to four
/// child references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl Cell {
    /// Build a byte-aligned cell. Payloads top out at 1023 bits, so a
    /// byte-aligned cell holds at most 127 bytes.
    pub fn new(data: Vec<u8>, refs: Vec<Arc<Cell>>) -> Result<Self, DecodeError> {
        if data.len() * 8 > 1023 {
            return Err(DecodeError::OversizedData);
        }
        if refs.len() > MAX_REFS {
            return Err(DecodeError::TooManyRefs);
        }
        let bit_len = data.len() * 8;
        Ok(Self { data, bit_len, refs })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.refs.get(index)
    }
}

/// Read cursor over a cell's payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSlice {
    cell: Arc<Cell>,
    pos: usize,
}

impl CellSlice {
    pub fn new(cell: Arc<Cell>) -> Self {
        Self { cell, pos: 0 }
    }

    pub(crate) fn with_offset(cell: Arc<Cell>, pos: usize) -> Self {
        Self { cell, pos }
    }

    /// Full payload bytes still unread (partial trailing bytes are not
    /// addressable through a slice).
    pub fn remaining(&self) -> usize {
        (self.cell.bit_len() / 8).saturating_sub(self.pos)
    }

    /// Read `n` bytes (n <= 32) as a big-endian unsigned integer and
    /// advance the cursor.
    pub fn load_be_uint(&mut self, n: usize) -> Option<U256> {
        if n == 0 || n > 32 || self.remaining() < n {
            return None;
        }
        let value = U256::from_be_slice(&self.cell.data()[self.pos..self.pos + n]);
        self.pos += n;
        Some(value)
    }
}

/// Extract (code, storage) from a raw account state blob.
///
/// The top-level cell's first reference is the executable code, the second
/// the persistent storage, by fixed protocol convention. Nothing else is
/// read out of the blob.
pub fn decode_account_state(raw: &[u8]) -> Result<(Arc<Cell>, Arc<Cell>), DecodeError> {
    let root = parse(raw)?;
    if root.refs().len() < 2 {
        return Err(DecodeError::MissingStateRefs {
            found: root.refs().len(),
        });
    }
    Ok((root.refs()[0].clone(), root.refs()[1].clone()))
}

/// Parse a bag of cells and return its first root.
pub fn parse(raw: &[u8]) -> Result<Arc<Cell>, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut r = ByteReader::new(raw);

    let magic = r.read_uint(4)? as u32;
    if magic != BOC_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let b1 = r.read_u8()?;
    let flags = b1 & 0xf8;
    if flags != 0 {
        // Index tables, cache bits and checksums are not produced by the
        // state fetch path
        return Err(DecodeError::UnsupportedFlags(flags));
    }
    let ref_size = (b1 & 0x07) as usize;
    if ref_size == 0 || ref_size > 4 {
        return Err(DecodeError::BadDescriptor { index: 0 });
    }
    let off_size = r.read_u8()? as usize;
    if off_size == 0 || off_size > 8 {
        return Err(DecodeError::BadDescriptor { index: 0 });
    }

    let cell_count = r.read_uint(ref_size)? as usize;
    let root_count = r.read_uint(ref_size)? as usize;
    let absent_count = r.read_uint(ref_size)? as usize;
    let _total_size = r.read_uint(off_size)?;
    if root_count == 0 {
        return Err(DecodeError::NoRoots);
    }
    if absent_count != 0 {
        return Err(DecodeError::UnsupportedFlags(b1));
    }

    let mut root_indices = Vec::with_capacity(root_count);
    for _ in 0..root_count {
        let idx = r.read_uint(ref_size)? as usize;
        if idx >= cell_count {
            return Err(DecodeError::BadReference {
                index: idx,
                reference: 0,
            });
        }
        root_indices.push(idx);
    }

    // First pass: raw descriptors with forward reference indices
    struct RawCell {
        data: Vec<u8>,
        bit_len: usize,
        refs: Vec<usize>,
    }
    let mut raw_cells = Vec::with_capacity(cell_count);
    for index in 0..cell_count {
        let d1 = r.read_u8()?;
        if d1 & 0x08 != 0 {
            // Exotic cells never appear in plain account state
            return Err(DecodeError::BadDescriptor { index });
        }
        let ref_count = (d1 & 0x07) as usize;
        if ref_count > MAX_REFS {
            return Err(DecodeError::BadDescriptor { index });
        }
        let d2 = r.read_u8()? as usize;
        let byte_len = (d2 + 1) / 2;
        if byte_len > MAX_DATA_BYTES {
            return Err(DecodeError::BadDescriptor { index });
        }
        let data = r.read_bytes(byte_len)?.to_vec();
        let bit_len = if d2 % 2 == 0 {
            byte_len * 8
        } else {
            // Odd d2: the last byte carries a completion tag after the
            // payload bits
            let last = *data.last().ok_or(DecodeError::BadDescriptor { index })?;
            if last == 0 {
                return Err(DecodeError::BadDescriptor { index });
            }
            (byte_len - 1) * 8 + 7 - last.trailing_zeros() as usize
        };
        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let reference = r.read_uint(ref_size)? as usize;
            // References must point strictly forward; this rules out cycles
            if reference <= index || reference >= cell_count {
                return Err(DecodeError::BadReference { index, reference });
            }
            refs.push(reference);
        }
        raw_cells.push(RawCell {
            data,
            bit_len,
            refs,
        });
    }

    // Second pass: materialize from the leaves up
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for index in (0..cell_count).rev() {
        let raw_cell = &raw_cells[index];
        let mut refs = Vec::with_capacity(raw_cell.refs.len());
        for &reference in &raw_cell.refs {
            match &built[reference] {
                Some(cell) => refs.push(cell.clone()),
                None => return Err(DecodeError::BadReference { index, reference }),
            }
        }
        built[index] = Some(Arc::new(Cell {
            data: raw_cell.data.clone(),
            bit_len: raw_cell.bit_len,
            refs,
        }));
    }

    built[root_indices[0]]
        .clone()
        .ok_or(DecodeError::NoRoots)
}

/// Serialize a cell tree into bag-of-cells form. Used to build fixtures and
/// by tests; shared subtrees are written once per reference rather than
/// deduplicated.
pub fn serialize(root: &Arc<Cell>) -> Vec<u8> {
    let mut cells = Vec::new();
    collect(root, &mut cells);

    let ref_size: usize = if cells.len() <= 0xff { 1 } else { 2 };
    let payload: Vec<u8> = {
        let mut out = Vec::new();
        let mut next_index = 0usize;
        emit(root, &mut out, &mut next_index, ref_size);
        out
    };
    let off_size: usize = if payload.len() <= 0xff { 1 } else { 4 };

    let mut out = Vec::new();
    out.extend(BOC_MAGIC.to_be_bytes());
    out.push(ref_size as u8);
    out.push(off_size as u8);
    write_uint(&mut out, cells.len() as u64, ref_size);
    write_uint(&mut out, 1, ref_size); // roots
    write_uint(&mut out, 0, ref_size); // absent
    write_uint(&mut out, payload.len() as u64, off_size);
    write_uint(&mut out, 0, ref_size); // root index
    out.extend(payload);
    out
}

fn collect(cell: &Arc<Cell>, out: &mut Vec<Arc<Cell>>) {
    out.push(cell.clone());
    for child in cell.refs() {
        collect(child, out);
    }
}

/// Emit `cell` at `*next_index` in preorder, children following their parent.
fn emit(cell: &Arc<Cell>, out: &mut Vec<u8>, next_index: &mut usize, ref_size: usize) {
    let my_index = *next_index;
    *next_index += 1;

    out.push(cell.refs().len() as u8);
    out.push((cell.data().len() * 2) as u8);
    out.extend(cell.data());

    // Children occupy consecutive index ranges after their parent; compute
    // each child's index from the subtree sizes of its elder siblings
    let mut child_index = my_index + 1;
    for child in cell.refs() {
        write_uint(out, child_index as u64, ref_size);
        child_index += subtree_size(child);
    }
    for child in cell.refs() {
        emit(child, out, next_index, ref_size);
    }
}

fn subtree_size(cell: &Arc<Cell>) -> usize {
    1 + cell.refs().iter().map(subtree_size).sum::<usize>()
}

fn write_uint(out: &mut Vec<u8>, value: u64, size: usize) {
    out.extend(&value.to_be_bytes()[8 - size..]);
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.buf.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_uint(&mut self, size: usize) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for _ in 0..size {
            value = (value << 8) | self.read_u8()? as u64;
        }
        Ok(value)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() - self.pos < n {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}
