//! # spindex CLI Entry Point
//!
//! Test harness for the spatial index. Reads newline-delimited operations
//! from a file or stdin and applies them to an index file:
//!
//! ```text
//! INSERT x1 y1 x2 y2 v        store rectangle (x1,y1)-(x2,y2) with payload v
//! DELETE x1 y1 x2 y2          remove the exact rectangle
//! OVERLAP_SEARCH x1 y1 x2 y2  report entries intersecting the rectangle
//! COMPRISE_SEARCH x1 y1 x2 y2 report entries fully inside the rectangle
//! ```
//!
//! Lines with an unknown keyword or too few coordinates are skipped.
//!
//! ## Usage
//!
//! ```bash
//! # run an operation file against a fresh index
//! spindex --create -f ops.txt ./demo.index
//!
//! # cross-check every operation against a brute-force oracle
//! spindex --create --check -f ops.txt ./demo.index
//!
//! # read operations from stdin and dump the tree afterwards
//! cat ops.txt | spindex --create --print ./demo.index
//! ```
//!
//! Exit code 0 on success, non-zero on any operation error or oracle
//! disagreement.

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use eyre::{bail, ensure, Result, WrapErr};
use spindex::{Mbr, SpatialIndex};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[derive(Debug)]
enum Operation {
    Insert(Mbr<f64>, u64),
    Delete(Mbr<f64>),
    OverlapSearch(Mbr<f64>),
    CompriseSearch(Mbr<f64>),
}

struct Options {
    index_path: PathBuf,
    ops_file: Option<PathBuf>,
    dimensions: usize,
    block_size: usize,
    create: bool,
    check: bool,
    print: bool,
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let options = match parse_args(&args)? {
        Some(options) => options,
        None => return Ok(()),
    };

    let operations = match &options.ops_file {
        Some(path) => {
            let file = File::open(path)
                .wrap_err_with(|| format!("failed to open operations file '{}'", path.display()))?;
            read_operations(BufReader::new(file), options.dimensions)?
        }
        None => read_operations(io::stdin().lock(), options.dimensions)?,
    };

    let dir = options
        .index_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = options
        .index_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "spindex.index".to_string());

    let key_size = 2 * options.dimensions * std::mem::size_of::<f64>();
    let value_size = std::mem::size_of::<u64>();

    let mut index: SpatialIndex<f64> = if options.create || !options.index_path.exists() {
        SpatialIndex::create(
            dir,
            &name,
            key_size,
            value_size,
            options.block_size,
            options.dimensions,
        )?
    } else {
        SpatialIndex::open(
            dir,
            &name,
            key_size,
            value_size,
            options.block_size,
            options.dimensions,
        )?
    };

    let mut oracle: Vec<(Mbr<f64>, u64)> = Vec::new();
    let total = operations.len();
    let started = Instant::now();

    for (i, op) in operations.iter().enumerate() {
        match op {
            Operation::Insert(key, value) => {
                index.insert(key, &value.to_le_bytes())?;
                if options.check {
                    oracle.push((key.clone(), *value));
                }
                println!("[{}/{}] INSERT {} value={}", i + 1, total, key, value);
            }
            Operation::Delete(key) => {
                let deleted = index.delete(key)?;
                if options.check {
                    let expected = oracle_delete(&mut oracle, key);
                    ensure!(
                        deleted == expected,
                        "operation {}: DELETE {} returned {}, oracle says {}",
                        i + 1,
                        key,
                        deleted,
                        expected
                    );
                }
                println!("[{}/{}] DELETE {} -> {}", i + 1, total, key, deleted);
            }
            Operation::OverlapSearch(key) => {
                let hits = index.overlap_search(key)?;
                if options.check {
                    let expected: Vec<_> = oracle
                        .iter()
                        .filter(|(k, _)| k.overlaps(key))
                        .cloned()
                        .collect();
                    check_results(i + 1, "OVERLAP_SEARCH", key, &hits, &expected)?;
                }
                println!("[{}/{}] OVERLAP_SEARCH {} -> {} hits", i + 1, total, key, hits.len());
            }
            Operation::CompriseSearch(key) => {
                let hits = index.containment_search(key)?;
                if options.check {
                    let expected: Vec<_> = oracle
                        .iter()
                        .filter(|(k, _)| key.contains(k))
                        .cloned()
                        .collect();
                    check_results(i + 1, "COMPRISE_SEARCH", key, &hits, &expected)?;
                }
                println!("[{}/{}] COMPRISE_SEARCH {} -> {} hits", i + 1, total, key, hits.len());
            }
        }
    }

    index.sync()?;

    println!(
        "{} operations in {:.3}ms{}",
        total,
        started.elapsed().as_secs_f64() * 1000.0,
        if options.check { ", oracle agreed" } else { "" }
    );

    if options.print {
        index.print_tree()?;
    }

    Ok(())
}

fn parse_args(args: &[String]) -> Result<Option<Options>> {
    if args.len() < 2 {
        print_usage();
        return Ok(None);
    }

    let mut index_path: Option<PathBuf> = None;
    let mut ops_file = None;
    let mut dimensions = 2;
    let mut block_size = 4096;
    let mut create = false;
    let mut check = false;
    let mut print = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--version" | "-v" => {
                println!("spindex {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--create" | "-c" => create = true,
            "--check" => check = true,
            "--print" => print = true,
            "-f" => {
                i += 1;
                ensure!(i < args.len(), "-f requires a file path");
                ops_file = Some(PathBuf::from(&args[i]));
            }
            "-d" => {
                i += 1;
                ensure!(i < args.len(), "-d requires a number");
                dimensions = args[i]
                    .parse()
                    .wrap_err_with(|| format!("invalid dimension count '{}'", args[i]))?;
            }
            "-b" => {
                i += 1;
                ensure!(i < args.len(), "-b requires a number");
                block_size = args[i]
                    .parse()
                    .wrap_err_with(|| format!("invalid block size '{}'", args[i]))?;
            }
            arg if arg.starts_with('-') => bail!("Unknown option: {}", arg),
            path => {
                if index_path.is_some() {
                    bail!("Multiple index paths specified");
                }
                index_path = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }

    let index_path = match index_path {
        Some(p) => p,
        None => {
            print_usage();
            return Ok(None);
        }
    };

    Ok(Some(Options {
        index_path,
        ops_file,
        dimensions,
        block_size,
        create,
        check,
        print,
    }))
}

fn print_usage() {
    println!("spindex - disk-resident spatial index test harness");
    println!();
    println!("Usage: spindex [OPTIONS] <index-path>");
    println!();
    println!("Options:");
    println!("  -f <file>      Read operations from file (default: stdin)");
    println!("  -d <dims>      Number of dimensions (default: 2)");
    println!("  -b <bytes>     Block size (default: 4096)");
    println!("  -c, --create   Create the index file (fails if it exists)");
    println!("  --check        Cross-check operations against a brute-force oracle");
    println!("  --print        Dump the tree after all operations");
    println!("  -h, --help     Show this help");
    println!("  -v, --version  Show version");
}

fn read_operations<R: BufRead>(reader: R, dimensions: usize) -> Result<Vec<Operation>> {
    let coord_count = 2 * dimensions;
    let mut operations = Vec::new();

    for line in reader.lines() {
        let line = line.wrap_err("failed to read operations input")?;
        let mut tokens = line.split_whitespace();

        let keyword = match tokens.next() {
            Some(k) => k,
            None => continue,
        };

        let rest: Vec<&str> = tokens.collect();
        let coords: Vec<f64> = rest
            .iter()
            .take(coord_count)
            .filter_map(|t| t.parse().ok())
            .collect();
        if coords.len() < coord_count {
            continue;
        }
        let key = Mbr::new(&coords);

        match keyword {
            "INSERT" => {
                let value = match rest.get(coord_count).and_then(|t| t.parse().ok()) {
                    Some(v) => v,
                    None => continue,
                };
                operations.push(Operation::Insert(key, value));
            }
            "DELETE" => operations.push(Operation::Delete(key)),
            "OVERLAP_SEARCH" => operations.push(Operation::OverlapSearch(key)),
            "COMPRISE_SEARCH" => operations.push(Operation::CompriseSearch(key)),
            _ => continue,
        }
    }

    Ok(operations)
}

fn oracle_delete(oracle: &mut Vec<(Mbr<f64>, u64)>, key: &Mbr<f64>) -> bool {
    match oracle.iter().position(|(k, _)| k == key) {
        Some(pos) => {
            oracle.remove(pos);
            true
        }
        None => false,
    }
}

/// Compares the index result multiset against the oracle's.
fn check_results(
    op_number: usize,
    what: &str,
    query: &Mbr<f64>,
    hits: &[(Mbr<f64>, Vec<u8>)],
    expected: &[(Mbr<f64>, u64)],
) -> Result<()> {
    let mut got: Vec<(Vec<u64>, u64)> = hits
        .iter()
        .map(|(k, v)| {
            let mut value = [0u8; 8];
            value.copy_from_slice(v);
            (sort_key(k), u64::from_le_bytes(value))
        })
        .collect();
    let mut want: Vec<(Vec<u64>, u64)> = expected
        .iter()
        .map(|(k, v)| (sort_key(k), *v))
        .collect();

    got.sort();
    want.sort();

    ensure!(
        got == want,
        "operation {}: {} {} found {} entries, oracle found {}",
        op_number,
        what,
        query,
        got.len(),
        want.len()
    );
    Ok(())
}

/// Order-preserving bit image of the coordinates, for multiset comparison.
fn sort_key(key: &Mbr<f64>) -> Vec<u64> {
    key.coords()
        .iter()
        .map(|c| {
            let bits = c.to_bits();
            // flip so that negative floats sort below positive ones
            if bits >> 63 == 1 {
                !bits
            } else {
                bits ^ (1 << 63)
            }
        })
        .collect()
}
