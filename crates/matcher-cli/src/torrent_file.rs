use std::path::PathBuf;

use anyhow::Context;
use buffers::ByteBufOwned;
use matcher_core::{TorrentDescriptor, TorrentFile};

/// Just enough of the bencoded `.torrent` dictionary to build a
/// [`TorrentDescriptor`] — the matcher itself never sees bencode, only the
/// decoded result.
#[derive(serde::Deserialize)]
struct RawTorrent {
    info: RawInfo,
}

#[derive(serde::Deserialize)]
struct RawInfo {
    #[serde(default)]
    name: Option<ByteBufOwned>,
    pieces: ByteBufOwned,
    #[serde(rename = "piece length")]
    piece_length: u32,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(serde::Deserialize)]
struct RawFile {
    length: u64,
    path: Vec<ByteBufOwned>,
}

/// Decodes a `.torrent` file's bytes into a [`TorrentDescriptor`].
pub fn decode_torrent_file(bytes: &[u8]) -> anyhow::Result<TorrentDescriptor> {
    let raw: RawTorrent = bencode::from_bytes(bytes).context("malformed bencode")?;

    let files = match raw.info.files {
        Some(files) => files
            .into_iter()
            .map(|f| -> anyhow::Result<TorrentFile> {
                let mut relative_path = PathBuf::new();
                for component in &f.path {
                    let s = std::str::from_utf8(component.0.as_ref())
                        .context("non-utf8 path component")?;
                    anyhow::ensure!(s != "..", "path traversal in torrent file list");
                    relative_path.push(s);
                }
                Ok(TorrentFile {
                    relative_path,
                    length: f.length,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?,
        None => {
            let length = raw.info.length.context("single-file torrent missing length")?;
            let name = match &raw.info.name {
                Some(n) => std::str::from_utf8(n.0.as_ref())
                    .context("non-utf8 name")?
                    .to_owned(),
                None => "torrent-content".to_owned(),
            };
            vec![TorrentFile {
                relative_path: PathBuf::from(name),
                length,
            }]
        }
    };

    Ok(TorrentDescriptor {
        piece_length: raw.info.piece_length,
        piece_digests: raw.info.pieces.0.to_vec(),
        files,
    })
}
