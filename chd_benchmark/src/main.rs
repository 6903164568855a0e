#![doc = include_str!("../README.md")]

mod inout;
use inout::{RawLines, XorShift32, XorShift64};

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::str::FromStr;

use chd::{uniq, BuildConf, Function, GetSize, Lanes};
use clap::{Parser, ValueEnum};
use cpu_time::ProcessTime;

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum KeyType {
    /// Parse and hash keys as 32-bit integers
    Uint32,
    /// Parse and hash keys as 64-bit integers
    Uint64,
    /// Hash keys as byte strings
    String,
}

/// CHD perfect hashing benchmark.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Conf {
    /// Keys given directly on the command line
    pub keys: Vec<String>,

    /// Read keys from the given file (- for the standard input), one per line
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Generate the given number of keys with a xor-shift generator
    #[arg(short = 'g', long)]
    pub generate: Option<usize>,

    /// Target average number of keys per bucket
    #[arg(short = 'l', long, default_value_t = 4)]
    pub lambda: usize,

    /// Target load factor of the output table, in percent
    #[arg(short = 'a', long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub alpha: u8,

    /// Seed of the hash family; drawn from the operating system if not given
    #[arg(short = 's', long)]
    pub seed: Option<u32>,

    /// Parse and hash keys as the given type
    #[arg(value_enum, short = 't', long, default_value_t = KeyType::Uint32)]
    pub key_type: KeyType,

    /// Avoid modular division by rounding table sizes to powers of two
    #[arg(short = '2', long)]
    pub nodiv: bool,

    /// Compact the displacement table after construction
    #[arg(short = 'c', long)]
    pub compact: bool,

    /// Do not print key-hash pairs
    #[arg(short = 'n', long)]
    pub noprint: bool,

    /// Report construction and lookup statistics
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    Ok(if path.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(path)?))
    })
}

fn parsed<K: FromStr>(text: &str) -> K {
    text.parse().unwrap_or_else(|_| {
        eprintln!("{}: invalid key", text);
        exit(1);
    })
}

fn integer_keys<K: FromStr>(conf: &Conf, generator: impl Iterator<Item = K>) -> io::Result<Vec<K>> {
    let mut keys: Vec<K> = conf.keys.iter().map(|text| parsed(text)).collect();
    if let Some(generated) = conf.generate {
        keys.extend(generator.take(generated));
    }
    if let Some(ref path) = conf.file {
        for line in reader(path)?.lines() {
            let line = line?;
            let text = line.trim();
            if !text.is_empty() { keys.push(parsed(text)); }
        }
    }
    Ok(keys)
}

fn string_keys(conf: &Conf, seed: u32) -> io::Result<Vec<Box<[u8]>>> {
    let mut keys: Vec<Box<[u8]>> = conf.keys.iter()
        .map(|text| text.as_bytes().to_vec().into_boxed_slice())
        .collect();
    if let Some(generated) = conf.generate {
        keys.extend(XorShift64(seed as u64 | 1).take(generated)
            .map(|v| format!("{:016x}", v).into_bytes().into_boxed_slice()));
    }
    if let Some(ref path) = conf.file {
        for key in RawLines(reader(path)?) {
            keys.push(key?);
        }
    }
    Ok(keys)
}

fn exec<K: Lanes + Ord>(mut keys: Vec<K>, conf: &Conf, seed: u32, show: impl Fn(&K) -> String) {
    let total = keys.len();
    let unique = uniq(&mut keys);
    keys.truncate(unique);
    if conf.verbose {
        if unique < total { eprintln!("dropped {} duplicate keys", total - unique); }
        eprintln!("loaded {} keys", unique);
    }

    let build_conf = BuildConf {
        lambda: conf.lambda,
        alpha: conf.alpha as usize,
        seed,
        nodiv: conf.nodiv,
    };
    let start = ProcessTime::now();
    let mut h = Function::with_conf(&keys, build_conf);
    let build_time = start.elapsed().as_secs_f64();
    if conf.compact { h.compact(); }

    if conf.verbose {
        eprintln!("found perfect hash for {} keys in {:.6}s", keys.len(), build_time);
        eprintln!("seed:{:#010x} r:{} m:{} d_max:{} bytes_per_entry:{} bits_per_key:{:.2} bucket_load:{:.2}",
            h.seed(), h.buckets(), h.range(), h.d_max(), h.element_bytes(),
            (h.size_bytes_dyn() * 8) as f64 / keys.len().max(1) as f64,
            keys.len() as f64 / h.buckets() as f64);

        let start = ProcessTime::now();
        let mut checksum = 0u64;
        for key in &keys {
            checksum = checksum.wrapping_add(h.get(key) as u64);
        }
        let lookup_time = start.elapsed().as_secs_f64();
        eprintln!("hashed {} keys in {:.6}s (checksum {})", keys.len(), lookup_time, checksum);
    }

    if !conf.noprint {
        for key in &keys {
            println!("{} : {}", show(key), h.get(key));
        }
    }
}

fn main() -> io::Result<()> {
    let conf = Conf::parse();
    let seed = conf.seed.unwrap_or_else(rand::random);
    match conf.key_type {
        KeyType::Uint32 =>
            exec(integer_keys(&conf, XorShift32(seed | 1))?, &conf, seed, |k| k.to_string()),
        KeyType::Uint64 =>
            exec(integer_keys(&conf, XorShift64(seed as u64 | 1))?, &conf, seed, |k| k.to_string()),
        KeyType::String =>
            exec(string_keys(&conf, seed)?, &conf, seed, |k| String::from_utf8_lossy(k).into_owned()),
    }
    Ok(())
}
