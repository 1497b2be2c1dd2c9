//! Fast-resume parsing (§4.G): turns the bencoded snapshot a previous
//! session left behind into `peer_map` / `piece_map` / `unfinished_pieces`
//! on a `CheckerJob`. Every step can fail with a plain message — this is
//! validation, not an exceptional condition, so `Result<(), String>` is
//! enough; nothing here panics on malformed input.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bencoder::bencode::Bencode;

use crate::session::peer_record::PeerAddr;

use super::adler32;
use super::job::{CheckerJob, UnfinishedPiece};

const FILE_FORMAT: &[u8] = b"libtorrent resume file";

pub fn parse(job: &mut CheckerJob) -> Result<(), String> {
    let bencode = Bencode::decode(&job.resume_data).map_err(|e| format!("{:?}", e))?;
    let dict = match &bencode {
        Bencode::BDict(d) => d,
        _ => return Err("fast-resume data is not a dictionary".to_string()),
    };

    check_file_format(dict)?;
    check_file_version(dict)?;
    check_info_hash(dict, &job.info_hash)?;

    if let Some(peers) = dict.get(b"peers".as_slice()) {
        job.peer_map = parse_peers(peers)?;
    }

    let num_pieces = job.piece_map.len();
    let slots = parse_slots(dict, num_pieces)?;
    job.piece_map = slots;

    parse_unfinished(dict, job)?;
    check_file_sizes(dict, job)?;
    match_filesizes(&job.save_path, job.torrent.metadata().length() as u64)?;

    Ok(())
}

fn get_string<'a>(dict: &'a BTreeMap<Vec<u8>, Bencode>, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key) {
        Some(Bencode::BString(s)) => Some(s.as_slice()),
        _ => None,
    }
}

fn get_number(dict: &BTreeMap<Vec<u8>, Bencode>, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Some(Bencode::BNumber(n)) => Some(*n),
        _ => None,
    }
}

fn check_file_format(dict: &BTreeMap<Vec<u8>, Bencode>) -> Result<(), String> {
    match get_string(dict, b"file-format") {
        Some(s) if s == FILE_FORMAT => Ok(()),
        _ => Err("unrecognized file-format".to_string()),
    }
}

fn check_file_version(dict: &BTreeMap<Vec<u8>, Bencode>) -> Result<(), String> {
    match get_number(dict, b"file-version") {
        Some(v) if v <= 1 => Ok(()),
        Some(v) => Err(format!("unsupported file-version {}", v)),
        None => Err("missing file-version".to_string()),
    }
}

fn check_info_hash(dict: &BTreeMap<Vec<u8>, Bencode>, expected: &[u8; 20]) -> Result<(), String> {
    match get_string(dict, b"info-hash") {
        Some(s) if s == expected => Ok(()),
        Some(_) => Err("info-hash does not match this torrent".to_string()),
        None => Err("missing info-hash".to_string()),
    }
}

fn parse_peers(bencode: &Bencode) -> Result<Vec<(PeerAddr, u16)>, String> {
    let list = match bencode {
        Bencode::BList(l) => l,
        _ => return Err("peers is not a list".to_string()),
    };
    let mut peers = Vec::with_capacity(list.len());
    for entry in list {
        let dict = match entry {
            Bencode::BDict(d) => d,
            _ => return Err("peers entry is not a dict".to_string()),
        };
        let ip = get_string(dict, b"ip").ok_or("peers entry missing ip")?;
        let ip = String::from_utf8(ip.to_vec()).map_err(|_| "peers ip is not utf-8")?;
        let port = get_number(dict, b"port").ok_or("peers entry missing port")?;
        let octets: Vec<u8> = ip.split('.').filter_map(|s| s.parse().ok()).collect();
        let addr = if octets.len() == 4 {
            PeerAddr::V4([octets[0], octets[1], octets[2], octets[3]])
        } else {
            PeerAddr::I2p(ip)
        };
        peers.push((addr, port as u16));
    }
    Ok(peers)
}

fn parse_slots(dict: &BTreeMap<Vec<u8>, Bencode>, num_pieces: usize) -> Result<Vec<i32>, String> {
    let list = match dict.get(b"slots".as_slice()) {
        Some(Bencode::BList(l)) => l,
        _ => return Err("missing slots".to_string()),
    };
    if list.len() > num_pieces {
        return Err("slots list longer than num_pieces".to_string());
    }
    let mut slots = vec![-2i32; num_pieces];
    for (i, entry) in list.iter().enumerate() {
        let value = match entry {
            Bencode::BNumber(n) => *n as i32,
            _ => return Err("slot entry is not a number".to_string()),
        };
        if value < -2 || value >= num_pieces as i32 {
            return Err(format!("slot index {} out of range", value));
        }
        slots[i] = value;
    }
    Ok(slots)
}

fn parse_unfinished(dict: &BTreeMap<Vec<u8>, Bencode>, job: &mut CheckerJob) -> Result<(), String> {
    let piece_length = job.torrent.metadata().piece_length();
    let blocks_per_piece = match get_number(dict, b"blocks per piece") {
        Some(v) => v,
        None => return Ok(()),
    };
    if job.block_size == 0 || blocks_per_piece != (piece_length as i64) / (job.block_size as i64) {
        return Ok(());
    }

    let list = match dict.get(b"unfinished".as_slice()) {
        Some(Bencode::BList(l)) => l,
        _ => return Ok(()),
    };

    let mut unfinished = Vec::new();
    for entry in list {
        let entry_dict = match entry {
            Bencode::BDict(d) => d,
            _ => return Err("unfinished entry is not a dict".to_string()),
        };
        let piece = get_number(entry_dict, b"piece").ok_or("unfinished entry missing piece")?;
        if piece < 0 || piece as usize >= job.piece_map.len() {
            return Err(format!("unfinished piece {} out of range", piece));
        }
        let bitmask = get_string(entry_dict, b"bitmask")
            .ok_or("unfinished entry missing bitmask")?
            .to_vec();
        let expected_len = (blocks_per_piece as usize).div_ceil(8).max(1);
        if bitmask.len() < expected_len {
            return Err("unfinished bitmask too short".to_string());
        }
        let adler = get_number(entry_dict, b"adler32").ok_or("unfinished entry missing adler32")?;

        if !bitmask_has_any_set_bit(&bitmask) {
            continue;
        }
        if job.piece_map[piece as usize] == -2 {
            return Err(format!(
                "piece {} marked as unfinished, but doesn't have any storage",
                piece
            ));
        }

        let on_disk = read_finished_blocks(job, piece as usize, &bitmask, job.block_size as usize)?;
        let computed = adler32::checksum(&on_disk);
        if computed as i64 != adler {
            return Err(format!("adler32 mismatch on piece {}", piece));
        }

        unfinished.push(UnfinishedPiece {
            piece: piece as usize,
            bitmask,
            adler32: adler as u32,
        });
    }
    job.unfinished_pieces = unfinished;
    Ok(())
}

fn bitmask_has_any_set_bit(bitmask: &[u8]) -> bool {
    bitmask.iter().any(|&byte| byte != 0)
}

/// Concatenates the on-disk bytes of every block the bitmask reports
/// finished, decoding bits LSB-first within each byte, matching the
/// teacher's piece-indexing convention elsewhere in this crate.
fn read_finished_blocks(
    job: &CheckerJob,
    piece: usize,
    bitmask: &[u8],
    block_size: usize,
) -> Result<Vec<u8>, String> {
    let path = Path::new(&job.save_path);
    let bytes = fs::read(path).map_err(|e| format!("reading {}: {}", job.save_path, e))?;
    let piece_length = job.torrent.metadata().piece_length() as usize;
    let piece_offset = piece * piece_length;

    let mut out = Vec::new();
    for (byte_index, byte) in bitmask.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) == 0 {
                continue;
            }
            let block_index = byte_index * 8 + bit;
            let start = piece_offset + block_index * block_size;
            let end = (start + block_size).min(bytes.len());
            if start < bytes.len() {
                out.extend_from_slice(&bytes[start..end]);
            }
        }
    }
    Ok(out)
}

fn check_file_sizes(dict: &BTreeMap<Vec<u8>, Bencode>, job: &CheckerJob) -> Result<(), String> {
    if !job.piece_map_is_complete() {
        return Ok(());
    }
    let list = match dict.get(b"file sizes".as_slice()) {
        Some(Bencode::BList(l)) => l,
        _ => return Err("missing file sizes for a complete piece map".to_string()),
    };
    // Multi-file torrents are unsupported: exactly one entry is expected.
    if list.len() != 1 {
        return Err(format!("expected 1 file size entry, found {}", list.len()));
    }
    let pair = match &list[0] {
        Bencode::BList(p) if p.len() == 2 => p,
        _ => return Err("file sizes entry is not a [size, mtime] pair".to_string()),
    };
    let size = match &pair[0] {
        Bencode::BNumber(n) => *n,
        _ => return Err("file size is not a number".to_string()),
    };
    if size != job.torrent.metadata().length() as i64 {
        return Err("recorded file size does not match the torrent".to_string());
    }
    Ok(())
}

/// Confirms the save path actually holds a file of the expected length.
/// Absence of the file is not itself a parse failure upstream of this
/// point — downloads may legitimately start from nothing — but once this
/// function is reached the caller has already decided file sizes matter.
fn match_filesizes(save_path: &str, expected_length: u64) -> Result<(), String> {
    match fs::metadata(save_path) {
        Ok(meta) if meta.len() == expected_length => Ok(()),
        Ok(meta) => Err(format!(
            "save path size {} does not match expected {}",
            meta.len(),
            expected_length
        )),
        Err(_) => Ok(()),
    }
}
