//! OLE2 compound-file container.
//!
//! Understands the sector/FAT structure of a compound file well enough to
//! enumerate named streams (including macro project streams) and to
//! rebuild a valid compound file with streams removed or replaced,
//! without interpreting any stream's internal format.
//!
//! The reader walks the DIFAT, FAT, mini-FAT, and the directory sibling
//! tree with cycle detection; every sector reference is bounds-checked
//! against the input. The writer emits a fresh version-3 file (512-byte
//! sectors): directory first, then mini-FAT, mini stream, regular
//! streams, DIFAT, and FAT, with every chain laid out contiguously.

use crate::Result;
use crate::error::DisarmError;
use crate::policy::Policy;

use super::{Container, Disposition, Member, Rebuilt};

const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const FREESECT: u32 = 0xFFFF_FFFF;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FATSECT: u32 = 0xFFFF_FFFD;
const DIFSECT: u32 = 0xFFFF_FFFC;
const MAXREGSECT: u32 = 0xFFFF_FFFA;
const NOSTREAM: u32 = 0xFFFF_FFFF;

const TYPE_UNUSED: u8 = 0;
const TYPE_STORAGE: u8 = 1;
const TYPE_STREAM: u8 = 2;
const TYPE_ROOT: u8 = 5;

const MINI_CUTOFF: u64 = 4096;
const MINI_SECTOR: usize = 64;
const DIR_ENTRY_LEN: usize = 128;

/// A storage (folder) surviving into the rebuilt file.
#[derive(Debug, Clone)]
struct StorageInfo {
    path: String,
    clsid: [u8; 16],
}

#[derive(Debug, Clone)]
struct StreamLoc {
    start: u32,
    size: u64,
}

/// OLE2 compound file opened over in-memory bytes.
pub struct Ole2File {
    data: Vec<u8>,
    sector_size: usize,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    mini_stream: Vec<u8>,
    members: Vec<Member>,
    locs: Vec<StreamLoc>,
    storages: Vec<StorageInfo>,
    root_clsid: [u8; 16],
}

impl Ole2File {
    /// Parses the compound file structure and enumerates its streams.
    pub fn open(bytes: &[u8], policy: &Policy) -> Result<Self> {
        let header = Header::parse(bytes)?;
        let fat = read_fat(bytes, &header)?;
        let entries = read_directory(bytes, &header, &fat)?;
        let minifat = read_minifat(bytes, &header, &fat)?;

        let root = entries
            .first()
            .filter(|e| e.typ == TYPE_ROOT)
            .ok_or_else(|| malformed("first directory entry is not the root"))?;
        let root_clsid = root.clsid;
        let mini_stream = read_chain(bytes, &header, &fat, root.start, root.size)?;

        let mut members = Vec::new();
        let mut locs = Vec::new();
        let mut storages = Vec::new();
        let mut total: u64 = 0;

        walk_tree(&entries, root.child, &mut |entry, path| {
            match entry.typ {
                TYPE_STORAGE => storages.push(StorageInfo {
                    path: path.to_string(),
                    clsid: entry.clsid,
                }),
                TYPE_STREAM => {
                    if entry.size > policy.max_member_bytes {
                        return Err(DisarmError::TooLarge {
                            what: "stream size",
                            actual: entry.size,
                            limit: policy.max_member_bytes,
                        });
                    }
                    total = total.saturating_add(entry.size);
                    if total > policy.max_total_bytes {
                        return Err(DisarmError::TooLarge {
                            what: "summed stream size",
                            actual: total,
                            limit: policy.max_total_bytes,
                        });
                    }
                    members.push(Member {
                        name: path.to_string(),
                        declared_size: entry.size,
                    });
                    locs.push(StreamLoc {
                        start: entry.start,
                        size: entry.size,
                    });
                }
                _ => {}
            }
            Ok(())
        })?;

        Ok(Self {
            data: bytes.to_vec(),
            sector_size: header.sector_size,
            fat,
            minifat,
            mini_stream,
            members,
            locs,
            storages,
            root_clsid,
        })
    }
}

impl Container for Ole2File {
    fn kind_name(&self) -> &'static str {
        "ole2"
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn member_bytes(&mut self, index: usize) -> Result<Vec<u8>> {
        let loc = self.locs[index].clone();
        if loc.size == 0 {
            return Ok(Vec::new());
        }
        if loc.size < MINI_CUTOFF {
            read_mini_chain(&self.mini_stream, &self.minifat, loc.start, loc.size)
        } else {
            let header = Header {
                sector_size: self.sector_size,
                ..Header::default()
            };
            read_chain(&self.data, &header, &self.fat, loc.start, loc.size)
        }
    }

    fn rebuild(&mut self, dispositions: &[Disposition]) -> Result<Rebuilt> {
        if dispositions.len() != self.members.len() {
            return Err(DisarmError::RebuildFailed(
                "disposition count does not match member count".into(),
            ));
        }

        let mut surviving: Vec<(String, Vec<u8>)> = Vec::new();
        for (i, disposition) in dispositions.iter().enumerate() {
            match disposition {
                Disposition::Keep => {
                    surviving.push((self.members[i].name.clone(), self.member_bytes(i)?));
                }
                Disposition::Replace(bytes) => {
                    surviving.push((self.members[i].name.clone(), bytes.clone()));
                }
                Disposition::Drop => {}
            }
        }

        let bytes = write_compound(self.root_clsid, &self.storages, &surviving)?;
        Ok(Rebuilt::Bytes(bytes))
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Header {
    sector_size: usize,
    num_fat: u32,
    first_dir: u32,
    first_minifat: u32,
    num_minifat: u32,
    first_difat: u32,
    num_difat: u32,
    difat: Vec<u32>,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 512 || data[..8] != MAGIC {
            return Err(malformed("missing compound file signature"));
        }
        if read_u16(data, 28) != 0xFFFE {
            return Err(malformed("bad byte-order mark"));
        }
        let shift = read_u16(data, 30);
        let sector_size = match shift {
            9 => 512,
            12 => 4096,
            _ => return Err(malformed("unsupported sector size")),
        };
        if read_u16(data, 32) != 6 {
            return Err(malformed("unsupported mini sector size"));
        }
        let mut difat = Vec::with_capacity(109);
        for i in 0..109 {
            difat.push(read_u32(data, 76 + i * 4));
        }
        Ok(Self {
            sector_size,
            num_fat: read_u32(data, 44),
            first_dir: read_u32(data, 48),
            first_minifat: read_u32(data, 60),
            num_minifat: read_u32(data, 64),
            first_difat: read_u32(data, 68),
            num_difat: read_u32(data, 72),
            difat,
        })
    }
}

fn sector<'a>(data: &'a [u8], header: &Header, id: u32) -> Result<&'a [u8]> {
    if id > MAXREGSECT {
        return Err(malformed("reference to a non-regular sector"));
    }
    let start = (id as usize + 1)
        .checked_mul(header.sector_size)
        .ok_or_else(|| malformed("sector offset overflow"))?;
    let end = start + header.sector_size;
    data.get(start..end)
        .ok_or_else(|| malformed("sector beyond end of file"))
}

fn read_fat(data: &[u8], header: &Header) -> Result<Vec<u32>> {
    let mut fat_sectors: Vec<u32> = header
        .difat
        .iter()
        .copied()
        .filter(|&id| id <= MAXREGSECT)
        .collect();

    let per_difat = header.sector_size / 4 - 1;
    let mut next = header.first_difat;
    let mut hops = 0u32;
    while next != ENDOFCHAIN && next != FREESECT {
        if hops > header.num_difat.min(0xFFFF) {
            return Err(malformed("DIFAT chain too long"));
        }
        let sec = sector(data, header, next)?;
        for i in 0..per_difat {
            let id = read_u32(sec, i * 4);
            if id <= MAXREGSECT {
                fat_sectors.push(id);
            }
        }
        next = read_u32(sec, per_difat * 4);
        hops += 1;
    }

    if fat_sectors.is_empty() && header.num_fat > 0 {
        return Err(malformed("no FAT sectors"));
    }

    let mut fat = Vec::with_capacity(fat_sectors.len() * (header.sector_size / 4));
    for id in fat_sectors {
        let sec = sector(data, header, id)?;
        for i in 0..header.sector_size / 4 {
            fat.push(read_u32(sec, i * 4));
        }
    }
    Ok(fat)
}

/// Follows a FAT chain collecting up to `size` bytes, cycle-capped.
fn read_chain(
    data: &[u8],
    header: &Header,
    fat: &[u32],
    start: u32,
    size: u64,
) -> Result<Vec<u8>> {
    // Declared size is attacker-controlled; never pre-allocate more
    // than the input could possibly hold.
    let cap = usize::try_from(size).unwrap_or(usize::MAX).min(data.len());
    let mut out = Vec::with_capacity(cap);
    let mut cur = start;
    let mut hops = 0usize;
    while cur != ENDOFCHAIN && (out.len() as u64) < size {
        if hops > fat.len() {
            return Err(malformed("FAT chain cycle"));
        }
        let sec = sector(data, header, cur)?;
        let want = usize::try_from(size - out.len() as u64)
            .unwrap_or(usize::MAX)
            .min(header.sector_size);
        out.extend_from_slice(&sec[..want]);
        cur = *fat
            .get(cur as usize)
            .ok_or_else(|| malformed("chain runs past FAT"))?;
        hops += 1;
    }
    if (out.len() as u64) < size {
        return Err(malformed("stream chain shorter than declared size"));
    }
    Ok(out)
}

fn read_minifat(data: &[u8], header: &Header, fat: &[u32]) -> Result<Vec<u32>> {
    if header.first_minifat == ENDOFCHAIN || header.num_minifat == 0 {
        return Ok(Vec::new());
    }
    let size = u64::from(header.num_minifat) * header.sector_size as u64;
    let raw = read_chain(data, header, fat, header.first_minifat, size)?;
    Ok(raw.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}

fn read_mini_chain(mini_stream: &[u8], minifat: &[u32], start: u32, size: u64) -> Result<Vec<u8>> {
    let cap = usize::try_from(size).unwrap_or(usize::MAX).min(mini_stream.len());
    let mut out = Vec::with_capacity(cap);
    let mut cur = start;
    let mut hops = 0usize;
    while cur != ENDOFCHAIN && (out.len() as u64) < size {
        if cur > MAXREGSECT || hops > minifat.len() {
            return Err(malformed("mini-FAT chain cycle"));
        }
        let off = cur as usize * MINI_SECTOR;
        let sec = mini_stream
            .get(off..off + MINI_SECTOR)
            .ok_or_else(|| malformed("mini sector beyond mini stream"))?;
        let want = usize::try_from(size - out.len() as u64)
            .unwrap_or(usize::MAX)
            .min(MINI_SECTOR);
        out.extend_from_slice(&sec[..want]);
        cur = *minifat
            .get(cur as usize)
            .ok_or_else(|| malformed("chain runs past mini-FAT"))?;
        hops += 1;
    }
    if (out.len() as u64) < size {
        return Err(malformed("mini stream chain shorter than declared size"));
    }
    Ok(out)
}

#[derive(Debug, Clone)]
struct DirEntry {
    name: String,
    typ: u8,
    left: u32,
    right: u32,
    child: u32,
    clsid: [u8; 16],
    start: u32,
    size: u64,
}

fn read_directory(data: &[u8], header: &Header, fat: &[u32]) -> Result<Vec<DirEntry>> {
    // The directory stream length is not declared; read whole sectors.
    let mut raw = Vec::new();
    let mut cur = header.first_dir;
    let mut hops = 0usize;
    while cur != ENDOFCHAIN {
        if hops > fat.len() {
            return Err(malformed("directory chain cycle"));
        }
        raw.extend_from_slice(sector(data, header, cur)?);
        cur = *fat
            .get(cur as usize)
            .ok_or_else(|| malformed("directory chain runs past FAT"))?;
        hops += 1;
    }

    let v3 = header.sector_size == 512;
    let mut entries = Vec::with_capacity(raw.len() / DIR_ENTRY_LEN);
    for chunk in raw.chunks_exact(DIR_ENTRY_LEN) {
        let name_len = read_u16(chunk, 64) as usize;
        let typ = chunk[66];
        if typ == TYPE_UNUSED || name_len < 2 || name_len > 64 || name_len % 2 != 0 {
            entries.push(DirEntry {
                name: String::new(),
                typ: TYPE_UNUSED,
                left: NOSTREAM,
                right: NOSTREAM,
                child: NOSTREAM,
                clsid: [0; 16],
                start: ENDOFCHAIN,
                size: 0,
            });
            continue;
        }
        let units: Vec<u16> = chunk[..name_len - 2]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let name = String::from_utf16_lossy(&units);
        let mut clsid = [0u8; 16];
        clsid.copy_from_slice(&chunk[80..96]);
        let mut size = read_u64(chunk, 120);
        if v3 {
            // Version 3 writers may leave garbage in the high half.
            size &= 0xFFFF_FFFF;
        }
        entries.push(DirEntry {
            name,
            typ,
            left: read_u32(chunk, 68),
            right: read_u32(chunk, 72),
            child: read_u32(chunk, 76),
            clsid,
            start: read_u32(chunk, 116),
            size,
        });
    }
    if entries.is_empty() {
        return Err(malformed("empty directory"));
    }
    Ok(entries)
}

/// In-order traversal of the sibling tree rooted at `first`, calling
/// `visit` with each storage/stream entry and its slash-joined path.
/// Iterative with an explicit stack; revisiting an entry is malformed.
fn walk_tree(
    entries: &[DirEntry],
    first: u32,
    visit: &mut dyn FnMut(&DirEntry, &str) -> Result<()>,
) -> Result<()> {
    let mut visited = vec![false; entries.len()];
    let mut stack: Vec<(u32, String, bool)> = vec![(first, String::new(), false)];

    while let Some((id, prefix, expanded)) = stack.pop() {
        if id == NOSTREAM {
            continue;
        }
        let idx = id as usize;
        let entry = entries
            .get(idx)
            .ok_or_else(|| malformed("directory id out of range"))?;
        if expanded {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            visit(entry, &path)?;
            if entry.typ == TYPE_STORAGE {
                stack.push((entry.child, path, false));
            }
        } else {
            if visited[idx] {
                return Err(malformed("directory sibling cycle"));
            }
            visited[idx] = true;
            if entry.typ == TYPE_UNUSED {
                continue;
            }
            stack.push((entry.right, prefix.clone(), false));
            stack.push((id, prefix.clone(), true));
            stack.push((entry.left, prefix, false));
        }
    }
    Ok(())
}

fn read_u16(data: &[u8], off: usize) -> u16 {
    data.get(off..off + 2)
        .map_or(0, |b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], off: usize) -> u32 {
    data.get(off..off + 4)
        .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(data: &[u8], off: usize) -> u64 {
    data.get(off..off + 8).map_or(0, |b| {
        u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    })
}

fn malformed(what: &str) -> DisarmError {
    DisarmError::MalformedContainer(format!("ole2: {what}"))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

const SECTOR: usize = 512;
const FAT_PER_SECTOR: usize = SECTOR / 4;

#[derive(Debug)]
struct Node {
    name: String,
    clsid: [u8; 16],
    children: Vec<usize>,
    stream: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct RawEntry {
    name: Vec<u16>,
    typ: u8,
    left: u32,
    right: u32,
    child: u32,
    clsid: [u8; 16],
    start: u32,
    size: u64,
}

impl RawEntry {
    fn unused() -> Self {
        Self {
            name: Vec::new(),
            typ: TYPE_UNUSED,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            clsid: [0; 16],
            start: ENDOFCHAIN,
            size: 0,
        }
    }
}

/// Writes a fresh version-3 compound file from storages and streams.
fn write_compound(
    root_clsid: [u8; 16],
    storages: &[StorageInfo],
    streams: &[(String, Vec<u8>)],
) -> Result<Vec<u8>> {
    let mut arena = vec![Node {
        name: "Root Entry".into(),
        clsid: root_clsid,
        children: Vec::new(),
        stream: None,
    }];

    for storage in storages {
        ensure_storage(&mut arena, &storage.path, storage.clsid)?;
    }
    for (path, bytes) in streams {
        let (parent_path, leaf) = split_parent(path);
        let parent = if parent_path.is_empty() {
            0
        } else {
            ensure_storage(&mut arena, parent_path, [0; 16])?
        };
        if encode_name(leaf).is_none() {
            return Err(DisarmError::RebuildFailed(format!(
                "stream name {leaf:?} does not fit a directory entry"
            )));
        }
        let idx = arena.len();
        arena.push(Node {
            name: leaf.to_string(),
            clsid: [0; 16],
            children: Vec::new(),
            stream: Some(bytes.clone()),
        });
        arena[parent].children.push(idx);
    }

    let mut entries = assemble_entries(&arena)?;

    // Partition stream content: small streams go to the mini stream.
    let mut mini = Vec::new();
    let mut minifat: Vec<u32> = Vec::new();
    let mut big: Vec<(usize, Vec<u8>)> = Vec::new(); // (entry id, bytes)
    for (id, node_idx) in entry_order(&arena).iter().enumerate() {
        let Some(bytes) = &arena[*node_idx].stream else {
            continue;
        };
        entries[id].size = bytes.len() as u64;
        if bytes.is_empty() {
            continue;
        }
        if (bytes.len() as u64) < MINI_CUTOFF {
            let first = minifat.len() as u32;
            let count = bytes.len().div_ceil(MINI_SECTOR);
            for i in 0..count {
                minifat.push(if i + 1 == count {
                    ENDOFCHAIN
                } else {
                    first + i as u32 + 1
                });
            }
            mini.extend_from_slice(bytes);
            mini.resize(minifat.len() * MINI_SECTOR, 0);
            entries[id].start = first;
        } else {
            big.push((id, bytes.clone()));
        }
    }

    let dir_sectors = (entries.len() * DIR_ENTRY_LEN).div_ceil(SECTOR);
    let minifat_sectors = (minifat.len() * 4).div_ceil(SECTOR);
    let mini_sectors = mini.len().div_ceil(SECTOR);
    let big_sectors: usize = big.iter().map(|(_, b)| b.len().div_ceil(SECTOR)).sum();
    let base = dir_sectors + minifat_sectors + mini_sectors + big_sectors;

    // FAT and DIFAT sizes depend on the total sector count; iterate to a
    // fixpoint (converges in a few rounds).
    let mut fat_sectors = 0usize;
    let mut difat_sectors = 0usize;
    loop {
        let total = base + fat_sectors + difat_sectors;
        let need_fat = total.max(1).div_ceil(FAT_PER_SECTOR);
        let need_difat = need_fat.saturating_sub(109).div_ceil(FAT_PER_SECTOR - 1);
        if need_fat == fat_sectors && need_difat == difat_sectors {
            break;
        }
        fat_sectors = need_fat;
        difat_sectors = need_difat;
    }
    let total_sectors = base + fat_sectors + difat_sectors;

    // Layout: [dir][minifat][ministream][big...][difat][fat]
    let minifat_start = dir_sectors;
    let mini_start = minifat_start + minifat_sectors;
    let big_start = mini_start + mini_sectors;
    let difat_start = big_start + big_sectors;
    let fat_start = difat_start + difat_sectors;

    // Root entry holds the mini stream.
    entries[0].size = mini.len() as u64;
    entries[0].start = if mini_sectors == 0 {
        ENDOFCHAIN
    } else {
        mini_start as u32
    };

    let mut fat = vec![FREESECT; fat_sectors * FAT_PER_SECTOR];
    let mut chain = |start: usize, count: usize| {
        for i in 0..count {
            fat[start + i] = if i + 1 == count {
                ENDOFCHAIN
            } else {
                (start + i + 1) as u32
            };
        }
    };
    chain(0, dir_sectors);
    chain(minifat_start, minifat_sectors);
    chain(mini_start, mini_sectors);
    let mut next_big = big_start;
    for (id, bytes) in &big {
        let count = bytes.len().div_ceil(SECTOR);
        entries[*id].start = next_big as u32;
        chain(next_big, count);
        next_big += count;
    }
    for i in 0..difat_sectors {
        fat[difat_start + i] = DIFSECT;
    }
    for i in 0..fat_sectors {
        fat[fat_start + i] = FATSECT;
    }

    // Serialize.
    let mut out = vec![0u8; SECTOR + total_sectors * SECTOR];
    write_header(
        &mut out,
        fat_sectors,
        minifat_sectors,
        minifat_start,
        difat_sectors,
        difat_start,
        fat_start,
    );

    let sector_off = |id: usize| SECTOR + id * SECTOR;
    for (i, entry) in entries.iter().enumerate() {
        let off = sector_off(0) + i * DIR_ENTRY_LEN;
        write_dir_entry(&mut out[off..off + DIR_ENTRY_LEN], entry);
    }
    for (i, val) in minifat.iter().enumerate() {
        let off = sector_off(minifat_start) + i * 4;
        out[off..off + 4].copy_from_slice(&val.to_le_bytes());
    }
    out[sector_off(mini_start)..sector_off(mini_start) + mini.len()].copy_from_slice(&mini);
    let mut cursor = big_start;
    for (_, bytes) in &big {
        out[sector_off(cursor)..sector_off(cursor) + bytes.len()].copy_from_slice(bytes);
        cursor += bytes.len().div_ceil(SECTOR);
    }
    // DIFAT sectors carry FAT sector ids 109.. plus a next pointer.
    for i in 0..difat_sectors {
        let off = sector_off(difat_start + i);
        for j in 0..FAT_PER_SECTOR - 1 {
            let fat_idx = 109 + i * (FAT_PER_SECTOR - 1) + j;
            let val = if fat_idx < fat_sectors {
                (fat_start + fat_idx) as u32
            } else {
                FREESECT
            };
            out[off + j * 4..off + j * 4 + 4].copy_from_slice(&val.to_le_bytes());
        }
        let next = if i + 1 < difat_sectors {
            (difat_start + i + 1) as u32
        } else {
            ENDOFCHAIN
        };
        let tail = off + (FAT_PER_SECTOR - 1) * 4;
        out[tail..tail + 4].copy_from_slice(&next.to_le_bytes());
    }
    for (i, val) in fat.iter().enumerate() {
        let off = sector_off(fat_start) + i * 4;
        out[off..off + 4].copy_from_slice(&val.to_le_bytes());
    }

    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn write_header(
    out: &mut [u8],
    fat_sectors: usize,
    minifat_sectors: usize,
    minifat_start: usize,
    difat_sectors: usize,
    difat_start: usize,
    fat_start: usize,
) {
    out[..8].copy_from_slice(&MAGIC);
    out[24..26].copy_from_slice(&0x003E_u16.to_le_bytes());
    out[26..28].copy_from_slice(&3_u16.to_le_bytes()); // major version 3
    out[28..30].copy_from_slice(&0xFFFE_u16.to_le_bytes());
    out[30..32].copy_from_slice(&9_u16.to_le_bytes()); // 512-byte sectors
    out[32..34].copy_from_slice(&6_u16.to_le_bytes()); // 64-byte mini sectors
    out[44..48].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
    out[48..52].copy_from_slice(&0_u32.to_le_bytes()); // directory at sector 0
    out[56..60].copy_from_slice(&(MINI_CUTOFF as u32).to_le_bytes());
    let first_minifat = if minifat_sectors == 0 {
        ENDOFCHAIN
    } else {
        minifat_start as u32
    };
    out[60..64].copy_from_slice(&first_minifat.to_le_bytes());
    out[64..68].copy_from_slice(&(minifat_sectors as u32).to_le_bytes());
    let first_difat = if difat_sectors == 0 {
        ENDOFCHAIN
    } else {
        difat_start as u32
    };
    out[68..72].copy_from_slice(&first_difat.to_le_bytes());
    out[72..76].copy_from_slice(&(difat_sectors as u32).to_le_bytes());
    for i in 0..109 {
        let val = if i < fat_sectors {
            (fat_start + i) as u32
        } else {
            FREESECT
        };
        out[76 + i * 4..80 + i * 4].copy_from_slice(&val.to_le_bytes());
    }
}

fn write_dir_entry(out: &mut [u8], entry: &RawEntry) {
    if entry.typ == TYPE_UNUSED {
        out[68..72].copy_from_slice(&NOSTREAM.to_le_bytes());
        out[72..76].copy_from_slice(&NOSTREAM.to_le_bytes());
        out[76..80].copy_from_slice(&NOSTREAM.to_le_bytes());
        return;
    }
    for (i, unit) in entry.name.iter().enumerate() {
        out[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    let name_len = ((entry.name.len() + 1) * 2) as u16;
    out[64..66].copy_from_slice(&name_len.to_le_bytes());
    out[66] = entry.typ;
    out[67] = 1; // black
    out[68..72].copy_from_slice(&entry.left.to_le_bytes());
    out[72..76].copy_from_slice(&entry.right.to_le_bytes());
    out[76..80].copy_from_slice(&entry.child.to_le_bytes());
    out[80..96].copy_from_slice(&entry.clsid);
    out[116..120].copy_from_slice(&entry.start.to_le_bytes());
    out[120..128].copy_from_slice(&entry.size.to_le_bytes());
}

fn ensure_storage(arena: &mut Vec<Node>, path: &str, clsid: [u8; 16]) -> Result<usize> {
    let mut cur = 0usize;
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    for (i, component) in components.iter().enumerate() {
        let found = arena[cur]
            .children
            .iter()
            .copied()
            .find(|&c| arena[c].name == *component && arena[c].stream.is_none());
        cur = match found {
            Some(idx) => idx,
            None => {
                if encode_name(component).is_none() {
                    return Err(DisarmError::RebuildFailed(format!(
                        "storage name {component:?} does not fit a directory entry"
                    )));
                }
                let idx = arena.len();
                arena.push(Node {
                    name: (*component).to_string(),
                    clsid: if i + 1 == components.len() { clsid } else { [0; 16] },
                    children: Vec::new(),
                    stream: None,
                });
                arena[cur].children.push(idx);
                idx
            }
        };
    }
    Ok(cur)
}

fn split_parent(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

/// Encodes a name as UTF-16; `None` when it exceeds the 31-unit field.
fn encode_name(name: &str) -> Option<Vec<u16>> {
    let units: Vec<u16> = name.encode_utf16().collect();
    (!units.is_empty() && units.len() <= 31).then_some(units)
}

/// Entry ids in assembly order: root first, then breadth-first by
/// storage with children in compound-file name order.
fn entry_order(arena: &[Node]) -> Vec<usize> {
    let mut order = vec![0usize];
    let mut queue = std::collections::VecDeque::from([0usize]);
    while let Some(n) = queue.pop_front() {
        let mut kids = arena[n].children.clone();
        kids.sort_by(|&a, &b| cfb_name_cmp(&arena[a].name, &arena[b].name));
        for &k in &kids {
            order.push(k);
            if arena[k].stream.is_none() {
                queue.push_back(k);
            }
        }
    }
    order
}

fn assemble_entries(arena: &[Node]) -> Result<Vec<RawEntry>> {
    let order = entry_order(arena);
    let mut entry_id = vec![u32::MAX; arena.len()];
    for (id, &node) in order.iter().enumerate() {
        entry_id[node] = id as u32;
    }

    let mut entries: Vec<RawEntry> = order
        .iter()
        .map(|&node| {
            let name_units = if node == 0 {
                "Root Entry".encode_utf16().collect()
            } else {
                encode_name(&arena[node].name).unwrap_or_default()
            };
            RawEntry {
                name: name_units,
                typ: if node == 0 {
                    TYPE_ROOT
                } else if arena[node].stream.is_some() {
                    TYPE_STREAM
                } else {
                    TYPE_STORAGE
                },
                left: NOSTREAM,
                right: NOSTREAM,
                child: NOSTREAM,
                clsid: arena[node].clsid,
                start: ENDOFCHAIN,
                size: 0,
            }
        })
        .collect();

    // Wire each storage's children into a balanced binary search tree.
    for &node in &order {
        if arena[node].stream.is_some() {
            continue;
        }
        let mut kids = arena[node].children.clone();
        kids.sort_by(|&a, &b| cfb_name_cmp(&arena[a].name, &arena[b].name));
        let kid_ids: Vec<u32> = kids.iter().map(|&k| entry_id[k]).collect();
        let child = build_bst(&kid_ids, &mut entries);
        entries[entry_id[node] as usize].child = child;
    }

    // Directory sectors hold a whole number of entries; pad with unused.
    let per_sector = SECTOR / DIR_ENTRY_LEN;
    while entries.len() % per_sector != 0 {
        entries.push(RawEntry::unused());
    }
    Ok(entries)
}

fn build_bst(ids: &[u32], entries: &mut [RawEntry]) -> u32 {
    if ids.is_empty() {
        return NOSTREAM;
    }
    let mid = ids.len() / 2;
    let root = ids[mid];
    let left = build_bst(&ids[..mid], entries);
    let right = build_bst(&ids[mid + 1..], entries);
    entries[root as usize].left = left;
    entries[root as usize].right = right;
    root
}

/// Compound-file directory ordering: shorter names first, then
/// case-insensitive UTF-16 comparison.
fn cfb_name_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let au: Vec<u16> = a.encode_utf16().collect();
    let bu: Vec<u16> = b.encode_utf16().collect();
    au.len().cmp(&bu.len()).then_with(|| {
        let fold = |units: &[u16]| -> Vec<u16> {
            units
                .iter()
                .map(|&u| {
                    char::from_u32(u32::from(u)).map_or(u, |c| {
                        c.to_ascii_uppercase() as u16
                    })
                })
                .collect()
        };
        fold(&au).cmp(&fold(&bu))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn build_sample(streams: &[(&str, &[u8])], storages: &[&str]) -> Vec<u8> {
        let infos: Vec<StorageInfo> = storages
            .iter()
            .map(|p| StorageInfo {
                path: (*p).to_string(),
                clsid: [0; 16],
            })
            .collect();
        let owned: Vec<(String, Vec<u8>)> = streams
            .iter()
            .map(|(n, b)| ((*n).to_string(), b.to_vec()))
            .collect();
        write_compound([0; 16], &infos, &owned).unwrap()
    }

    #[test]
    fn test_round_trip_small_streams() {
        let bytes = build_sample(&[("WordDocument", b"hello"), ("1Table", b"table")], &[]);
        let mut file = Ole2File::open(&bytes, &Policy::default()).unwrap();
        let names: Vec<&str> = file.members().iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"WordDocument"));
        assert!(names.contains(&"1Table"));
        let idx = names.iter().position(|&n| n == "WordDocument").unwrap();
        assert_eq!(file.member_bytes(idx).unwrap(), b"hello");
    }

    #[test]
    fn test_round_trip_big_stream() {
        let big: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let bytes = build_sample(&[("Data", &big)], &[]);
        let mut file = Ole2File::open(&bytes, &Policy::default()).unwrap();
        assert_eq!(file.members()[0].declared_size, big.len() as u64);
        assert_eq!(file.member_bytes(0).unwrap(), big);
    }

    #[test]
    fn test_nested_storages() {
        let bytes = build_sample(
            &[
                ("WordDocument", b"doc"),
                ("Macros/VBA/dir", b"\x01\x16\x01\x00"),
                ("Macros/VBA/Module1", b"Sub Evil()"),
            ],
            &["Macros", "Macros/VBA"],
        );
        let file = Ole2File::open(&bytes, &Policy::default()).unwrap();
        let names: Vec<&str> = file.members().iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"Macros/VBA/dir"));
        assert!(names.contains(&"Macros/VBA/Module1"));
        assert!(names.contains(&"WordDocument"));
    }

    #[test]
    fn test_rebuild_drops_macro_streams() {
        let bytes = build_sample(
            &[("WordDocument", b"doc"), ("Macros/VBA/Module1", b"Sub Evil()")],
            &["Macros", "Macros/VBA"],
        );
        let mut file = Ole2File::open(&bytes, &Policy::default()).unwrap();
        let dispositions: Vec<Disposition> = file
            .members()
            .iter()
            .map(|m| {
                if m.name.starts_with("Macros/") {
                    Disposition::Drop
                } else {
                    Disposition::Keep
                }
            })
            .collect();
        let Rebuilt::Bytes(rebuilt) = file.rebuild(&dispositions).unwrap() else {
            panic!("ole2 rebuild must produce bytes");
        };

        let mut reread = Ole2File::open(&rebuilt, &Policy::default()).unwrap();
        let names: Vec<String> = reread.members().iter().map(|m| m.name.clone()).collect();
        assert_eq!(names, vec!["WordDocument".to_string()]);
        assert_eq!(reread.member_bytes(0).unwrap(), b"doc");
    }

    #[test]
    fn test_rebuild_replace_stream() {
        let bytes = build_sample(&[("Contents", b"original")], &[]);
        let mut file = Ole2File::open(&bytes, &Policy::default()).unwrap();
        let Rebuilt::Bytes(rebuilt) = file
            .rebuild(&[Disposition::Replace(b"sanitized".to_vec())])
            .unwrap()
        else {
            panic!("ole2 rebuild must produce bytes");
        };
        let mut reread = Ole2File::open(&rebuilt, &Policy::default()).unwrap();
        assert_eq!(reread.member_bytes(0).unwrap(), b"sanitized");
    }

    #[test]
    fn test_truncated_input_is_malformed() {
        let err = Ole2File::open(&MAGIC, &Policy::default());
        assert!(matches!(err, Err(DisarmError::MalformedContainer(_))));
    }

    #[test]
    fn test_garbage_after_magic_is_malformed() {
        let mut bytes = vec![0u8; 512];
        bytes[..8].copy_from_slice(&MAGIC);
        // Byte-order mark and sector shift are zero: invalid header.
        let err = Ole2File::open(&bytes, &Policy::default());
        assert!(matches!(err, Err(DisarmError::MalformedContainer(_))));
    }

    #[test]
    fn test_stream_size_policy_guard() {
        let big = vec![0u8; 8192];
        let bytes = build_sample(&[("Data", &big)], &[]);
        let policy = Policy {
            max_member_bytes: 4096,
            ..Policy::default()
        };
        let err = Ole2File::open(&bytes, &policy);
        assert!(matches!(err, Err(DisarmError::TooLarge { .. })));
    }

    #[test]
    fn test_engine_strips_macros_from_legacy_doc() {
        use crate::engine::Sanitizer;
        use crate::verdict::Status;

        let bytes = build_sample(
            &[
                ("WordDocument", b"plain body text"),
                ("Macros/VBA/Module1", b"Sub AutoOpen()"),
            ],
            &["Macros", "Macros/VBA"],
        );
        let engine = Sanitizer::new(Policy::default());
        let scan = engine.scan_bytes("legacy.doc", bytes);
        assert_eq!(scan.status, Status::Cleaned);
        assert_eq!(scan.verdict.status, Status::Blocked);

        let out = scan.output.unwrap();
        let reread = Ole2File::open(&out, &Policy::default()).unwrap();
        assert!(reread.members().iter().all(|m| !m.name.starts_with("Macros/")));
        assert!(reread.members().iter().any(|m| m.name == "WordDocument"));
    }

    #[test]
    fn test_cfb_name_ordering() {
        use std::cmp::Ordering;
        // Shorter names sort first regardless of content.
        assert_eq!(cfb_name_cmp("zz", "aaa"), Ordering::Less);
        assert_eq!(cfb_name_cmp("abc", "ABD"), Ordering::Less);
    }

    proptest::proptest! {
        // Covers both sides of the mini-stream cutoff.
        #[test]
        fn prop_stream_bytes_round_trip(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..10_000)
        ) {
            let bytes = build_sample(&[("Data", &data)], &[]);
            let mut file = Ole2File::open(&bytes, &Policy::default()).unwrap();
            proptest::prop_assert_eq!(file.member_bytes(0).unwrap(), data);
        }
    }
}
