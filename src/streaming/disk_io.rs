//! Chunk compression and the on-disk chunk store file
//!
//! File layout (little-endian):
//!
//! ```text
//! magic    b"VXDB"
//! version  u32
//! "PROP"   u32 row count, rows of (u32 len, name bytes, u32 len, value bytes)
//! "BLKS"   u32 row count, rows of (u64 region key, u32 len, compressed blob)
//! "OVRC"   u32 row count, same row layout as BLKS
//! ```
//!
//! Blobs are LZ4 blocks with the decompressed size prepended.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::core::error::Error;
use crate::core::types::Result;

const MAGIC: &[u8; 4] = b"VXDB";
const VERSION: u32 = 1;

const PROPERTIES_TAG: &[u8; 4] = b"PROP";
const BLOCKS_TAG: &[u8; 4] = b"BLKS";
const OVERRIDE_CHUNKS_TAG: &[u8; 4] = b"OVRC";

/// Upper bound on a single row field, guards against reading garbage lengths
const MAX_FIELD_LEN: u32 = 64 * 1024 * 1024;

/// Compress raw chunk bytes using LZ4
pub fn compress_chunk(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

/// Decompress a chunk blob and check it has exactly `expected_len` bytes
pub fn decompress_chunk(blob: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    // Checked before decompressing so a corrupt header cannot trigger a huge allocation
    let header: [u8; 4] = blob
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| Error::Compression("chunk blob is truncated".into()))?;
    let declared = u32::from_le_bytes(header) as usize;
    if declared != expected_len {
        return Err(Error::Compression(format!(
            "chunk declares {} bytes, expected {}",
            declared, expected_len
        )));
    }

    let data = lz4_flex::decompress_size_prepended(blob)
        .map_err(|e| Error::Compression(format!("LZ4 decompression failed: {}", e)))?;
    if data.len() != expected_len {
        return Err(Error::Compression(format!(
            "decompressed {} bytes, expected {}",
            data.len(),
            expected_len
        )));
    }
    Ok(data)
}

/// Tables of a chunk store as held in memory
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StoreTables {
    pub properties: BTreeMap<String, String>,
    pub blocks: HashMap<u64, Vec<u8>>,
    pub override_chunks: HashMap<u64, Vec<u8>>,
}

/// Read a store file.
pub fn read_store(path: &Path) -> io::Result<StoreTables> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    // Read and validate header
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid magic bytes"));
    }

    let version = read_u32(&mut reader)?;
    if version != VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unsupported version: {}", version),
        ));
    }

    let mut tables = StoreTables::default();

    expect_tag(&mut reader, PROPERTIES_TAG)?;
    for _ in 0..read_u32(&mut reader)? {
        let name = read_string(&mut reader)?;
        let value = read_string(&mut reader)?;
        tables.properties.insert(name, value);
    }

    expect_tag(&mut reader, BLOCKS_TAG)?;
    read_blob_rows(&mut reader, &mut tables.blocks)?;

    expect_tag(&mut reader, OVERRIDE_CHUNKS_TAG)?;
    read_blob_rows(&mut reader, &mut tables.override_chunks)?;

    Ok(tables)
}

/// Write a store file atomically (temp file, then rename).
///
/// `override_chunks` may be empty to persist only committed state.
pub fn write_store(
    path: &Path,
    properties: &BTreeMap<String, String>,
    blocks: &HashMap<u64, Vec<u8>>,
    override_chunks: &HashMap<u64, Vec<u8>>,
) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;

        writer.write_all(PROPERTIES_TAG)?;
        write_len(&mut writer, properties.len())?;
        for (name, value) in properties {
            write_bytes(&mut writer, name.as_bytes())?;
            write_bytes(&mut writer, value.as_bytes())?;
        }

        writer.write_all(BLOCKS_TAG)?;
        write_blob_rows(&mut writer, blocks)?;

        writer.write_all(OVERRIDE_CHUNKS_TAG)?;
        write_blob_rows(&mut writer, override_chunks)?;

        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    std::fs::rename(&temp_path, path)
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn expect_tag<R: Read>(reader: &mut R, tag: &[u8; 4]) -> io::Result<()> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    if &buf != tag {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Expected section {:?}", String::from_utf8_lossy(tag)),
        ));
    }
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(reader)?;
    if len > MAX_FIELD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Field length {} exceeds limit", len),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    String::from_utf8(read_bytes(reader)?)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn read_blob_rows<R: Read>(reader: &mut R, table: &mut HashMap<u64, Vec<u8>>) -> io::Result<()> {
    for _ in 0..read_u32(reader)? {
        let key = read_u64(reader)?;
        let blob = read_bytes(reader)?;
        table.insert(key, blob);
    }
    Ok(())
}

fn write_len<W: Write>(writer: &mut W, len: usize) -> io::Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Length does not fit in u32"))?;
    writer.write_all(&len.to_le_bytes())
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_len(writer, bytes.len())?;
    writer.write_all(bytes)
}

fn write_blob_rows<W: Write>(writer: &mut W, table: &HashMap<u64, Vec<u8>>) -> io::Result<()> {
    // Sorted so identical tables produce identical files
    let mut keys: Vec<u64> = table.keys().copied().collect();
    keys.sort_unstable();

    write_len(writer, keys.len())?;
    for key in keys {
        writer.write_all(&key.to_le_bytes())?;
        write_bytes(writer, &table[&key])?;
    }
    Ok(())
}
