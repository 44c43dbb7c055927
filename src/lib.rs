//! Gzip-compress one file into another.

use std::{
    ffi::OsString,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, ensure};
use crc32fast::Hasher;
use gzip_header::{FileSystemType, GzBuilder};
use memmap2::Mmap;
use zlib_rs::{
    DeflateFlush, MAX_WBITS, ReturnCode,
    deflate::{self, DeflateConfig},
};

const CHUNK_SIZE: usize = 128 * 1024; // 128 KiB

/// Source and destination paths for one compression run.
#[derive(Clone, Debug)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl Config {
    /// Pairs `input` with an output path derived by appending `.gz` to its
    /// final extension: `page.html` becomes `page.html.gz`, `README`
    /// becomes `README.gz`.
    pub fn for_file(input: PathBuf) -> Self {
        let gz_extension = input
            .extension()
            .map(|e| {
                let mut e = e.to_owned();
                e.push(".gz");
                e
            })
            .unwrap_or_else(|| OsString::from("gz"));
        let output_path = input.with_extension(gz_extension);

        Config {
            input_path: input,
            output_path,
        }
    }
}

/// Copies `config.input_path` through a gzip encoder into
/// `config.output_path`, creating or overwriting the destination.
///
/// The container is deterministic: a fixed header (zero MTIME, unknown OS,
/// no name or comment), a raw deflate payload at the default compression
/// level, and a CRC32/ISIZE trailer. Compressing the same bytes twice
/// yields byte-identical output.
///
/// The input file is opened before the output is touched, so a missing
/// input fails without creating or truncating the destination. Every
/// failure is propagated immediately with the underlying `std::io::Error`
/// left intact in the chain; a failure mid-copy may leave a partially
/// written destination behind.
pub fn compress_file(config: &Config) -> Result<()> {
    let input = File::open(&config.input_path)
        .with_context(|| format!("failed to open {}", config.input_path.display()))?;
    let input_len = input.metadata()?.len();

    // A zero-length file cannot be mapped; an empty slice stands in for it.
    let mmap = if input_len == 0 {
        None
    } else {
        Some(unsafe { Mmap::map(&input)? })
    };
    let data = mmap.as_deref().unwrap_or(&[]);

    let output = File::create(&config.output_path)
        .with_context(|| format!("failed to create {}", config.output_path.display()))?;
    let mut writer = BufWriter::new(output);

    let header = GzBuilder::new().os(FileSystemType::Unknown).into_header();
    writer.write_all(&header)?;

    // An empty input still goes through one finished chunk so the payload
    // is a terminated deflate stream.
    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(CHUNK_SIZE).collect()
    };
    let last = chunks.len() - 1;

    let mut scratch = vec![0; deflate::compress_bound(CHUNK_SIZE)];
    let mut hasher = Hasher::new();

    for (i, chunk) in chunks.into_iter().enumerate() {
        let deflated = deflate_chunk(&mut scratch, chunk, i == last)?;
        writer
            .write_all(deflated)
            .with_context(|| format!("failed to write chunk {i}"))?;
        hasher.update(chunk);
    }

    let crc = hasher.finalize();
    writer.write_all(&crc.to_le_bytes())?;
    // ISIZE is the input length mod 2^32.
    writer.write_all(&(input_len as u32).to_le_bytes())?;

    writer.flush()?;

    Ok(())
}

fn deflate_chunk<'a>(output: &'a mut [u8], chunk: &[u8], is_last: bool) -> Result<&'a [u8]> {
    let config = DeflateConfig {
        // A negative `window_bits` generates raw deflate data with no zlib header or trailer.
        window_bits: -MAX_WBITS,
        ..Default::default()
    };

    // Interior chunks end on a sync flush so their streams concatenate;
    // the final chunk terminates the stream.
    let (flush, expected_err) = if is_last {
        (DeflateFlush::Finish, ReturnCode::Ok)
    } else {
        (DeflateFlush::SyncFlush, ReturnCode::DataError)
    };

    let (deflated, err) = deflate::compress_slice_with_flush(output, chunk, config, flush);
    ensure!(err == expected_err, "failed to deflate");

    Ok(deflated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_gz_to_the_extension() {
        let config = Config::for_file(PathBuf::from("main/www/index.html"));
        assert_eq!(config.input_path, PathBuf::from("main/www/index.html"));
        assert_eq!(config.output_path, PathBuf::from("main/www/index.html.gz"));
    }

    #[test]
    fn extensionless_input_gains_a_gz_extension() {
        let config = Config::for_file(PathBuf::from("README"));
        assert_eq!(config.output_path, PathBuf::from("README.gz"));
    }

    #[test]
    fn dotted_directories_do_not_confuse_the_derivation() {
        let config = Config::for_file(PathBuf::from("site.v2/page"));
        assert_eq!(config.output_path, PathBuf::from("site.v2/page.gz"));
    }

    #[test]
    fn stacked_extensions_keep_the_full_suffix() {
        let config = Config::for_file(PathBuf::from("bundle.tar"));
        assert_eq!(config.output_path, PathBuf::from("bundle.tar.gz"));
    }
}
