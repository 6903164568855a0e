use std::io;

use binout::{AsIs, Serializer, VByte};
use bitm::{ceiling_div, BitAccess, BitVec};
use dyn_size_of::GetSize;

use crate::displacements::Displacements;
use crate::hash::{f, g, Lanes};
use crate::stats::BuildStatsCollector;
use crate::utils::to_io_error;

/// Build configuration that is accepted by [`Function`] constructors.
///
/// See field descriptions for details.
#[derive(Clone, Copy)]
pub struct BuildConf {
    /// Target average number of keys per bucket. (default: `4`)
    ///
    /// Smaller values speed up construction at the expense of a larger
    /// displacement table.
    pub lambda: usize,

    /// Target load factor of the output table, as a percent in *[1, 100]*.
    /// (default: `80`)
    ///
    /// The value 100 makes the constructed function minimal. Smaller values
    /// speed up construction and lower displacements at the expense of a
    /// sparser output range.
    pub alpha: usize,

    /// Seed of the hash family. (default: `0`)
    ///
    /// The seed determines the entire construction; the caller supplies
    /// entropy here if unpredictable functions are wanted.
    pub seed: u32,

    /// Whether to round the number of buckets and the output range up to the
    /// nearest powers of two, so that every reduction is a bit mask instead
    /// of a modulo division. (default: `false`)
    ///
    /// Divide-mode callers that want prime table sizes are expected to
    /// pre-round their parameters; see [`is_prime`](crate::is_prime).
    pub nodiv: bool,
}

impl Default for BuildConf {
    fn default() -> Self {
        Self { lambda: 4, alpha: 80, seed: 0, nodiv: false }
    }
}

impl BuildConf {
    /// Returns configuration that uses the given `seed` of the hash family.
    pub fn seed(seed: u32) -> Self {
        Self { seed, ..Default::default() }
    }

    /// Returns configuration that uses custom `lambda` and `alpha`.
    pub fn la(lambda: usize, alpha: usize) -> Self {
        Self { lambda, alpha, ..Default::default() }
    }

    /// Returns configuration that uses custom `lambda`, `alpha` and `seed`.
    pub fn la_seed(lambda: usize, alpha: usize, seed: u32) -> Self {
        Self { lambda, alpha, seed, ..Default::default() }
    }

    /// Returns configuration that potentially avoids modular division by
    /// rounding table sizes to powers of two.
    pub fn pow2(nodiv: bool) -> Self {
        Self { nodiv, ..Default::default() }
    }
}

/// Reduces the hash value `h` modulo `modulus`; with a bit mask if `nodiv`
/// (then `modulus` must be a power of two).
#[inline(always)]
fn reduce(h: u32, modulus: usize, nodiv: bool) -> usize {
    if nodiv { h as usize & (modulus - 1) } else { h as usize % modulus }
}

/// CHD (compress, hash, displace) perfect hash function.
///
/// Maps every key of the set given during construction to a unique index in
/// the range from `0` (inclusive) to [`range`](Self::range) (exclusive).
/// Querying is constant time and does not need the input keys. A built
/// function is immutable and can be queried from many threads.
///
/// See: D. Belazzougui, F. C. Botelho, M. Dietzfelbinger,
/// *Hash, displace, and compress*, ESA 2009.
#[derive(Clone)]
pub struct Function {
    displacements: Displacements,
    seed: u32,
    buckets: usize,
    range: usize,
    nodiv: bool,
    d_max: u32,
}

impl GetSize for Function {
    fn size_bytes_dyn(&self) -> usize { self.displacements.size_bytes_dyn() }
    fn size_bytes_content_dyn(&self) -> usize { self.displacements.size_bytes_content_dyn() }
    const USES_DYN_MEM: bool = true;
}

impl Function {
    /// Size of the output index space (*m*); at least the number of input keys.
    #[inline] pub fn range(&self) -> usize { self.range }

    /// Number of first-level buckets (*r*), which equals the number of
    /// displacement table entries.
    #[inline] pub fn buckets(&self) -> usize { self.buckets }

    /// Seed of the hash family used.
    #[inline] pub fn seed(&self) -> u32 { self.seed }

    /// The maximum displacement committed during construction.
    #[inline] pub fn d_max(&self) -> u32 { self.d_max }

    /// Whether reductions use bit masks against power-of-two table sizes
    /// instead of modulo division.
    #[inline] pub fn nodiv(&self) -> bool { self.nodiv }

    /// Bytes per displacement table entry: 1, 2 or 4. See [`Self::compact`].
    #[inline] pub fn element_bytes(&self) -> u8 { self.displacements.element_bytes() }

    /// Gets the index assigned to the given `key`.
    ///
    /// The returned value is in the range from `0` (inclusive) to
    /// [`range`](Self::range) (exclusive). If the `key` was not in the input
    /// key collection given during construction, an undetermined value from
    /// the same range is returned.
    #[inline]
    pub fn get<K: Lanes + ?Sized>(&self, key: &K) -> u32 {
        let bucket = reduce(g(key, self.seed), self.buckets, self.nodiv);
        let d = self.displacements.get(bucket);
        reduce(f(d, key, self.seed), self.range, self.nodiv) as u32
    }

    /// Rewrites the displacement table at the smallest element width (8, 16
    /// or 32 bits) that holds every committed displacement.
    ///
    /// Queries are unaffected; compacting twice is a no-op.
    pub fn compact(&mut self) {
        self.displacements.narrow(self.d_max);
    }

    /// Returns the number of bytes which `write` will write.
    pub fn write_bytes(&self) -> usize {
        AsIs::size(self.seed)
            + AsIs::size(self.nodiv as u8)
            + VByte::size(self.buckets as u64)
            + VByte::size(self.range as u64)
            + VByte::size(self.d_max)
            + self.displacements.write_bytes()
    }

    /// Writes `self` to the `output`.
    pub fn write(&self, output: &mut dyn io::Write) -> io::Result<()> {
        AsIs::write(output, self.seed)?;
        AsIs::write(output, self.nodiv as u8)?;
        VByte::write(output, self.buckets as u64)?;
        VByte::write(output, self.range as u64)?;
        VByte::write(output, self.d_max)?;
        self.displacements.write(output)
    }

    /// Reads `Self` from the `input`.
    pub fn read(input: &mut dyn io::Read) -> io::Result<Self> {
        let seed: u32 = AsIs::read(input)?;
        let nodiv: u8 = AsIs::read(input)?;
        if nodiv > 1 { return Err(to_io_error("invalid reduction mode")); }
        let buckets: u64 = VByte::read(input)?;
        let range: u64 = VByte::read(input)?;
        let d_max: u32 = VByte::read(input)?;
        let displacements = Displacements::read(input, buckets as usize)?;
        Ok(Self {
            displacements,
            seed,
            buckets: buckets as usize,
            range: range as usize,
            nodiv: nodiv != 0,
            d_max,
        })
    }

    /// Constructs [`Function`] for the given `keys`, using the build
    /// configuration `conf` and reporting construction events to `stats`.
    ///
    /// The keys must be distinct; [`None`] is returned otherwise. Callers
    /// with possibly repeating input deduplicate first, e.g. with
    /// [`uniq`](crate::uniq). An empty `keys` slice is legal and produces an
    /// empty function.
    pub fn try_with_conf_stats<K, BS>(keys: &[K], conf: BuildConf, stats: &mut BS) -> Option<Self>
        where K: Lanes + Ord, BS: BuildStatsCollector
    {
        let n = keys.len();
        let n1 = n.max(1);
        let l1 = conf.lambda.max(1);
        let a1 = conf.alpha.clamp(1, 100);
        let (buckets, range) = if conf.nodiv {
            ((n1 / l1.min(n1)).next_power_of_two(), (n1 * 100 / a1).next_power_of_two())
        } else {
            (ceiling_div(n1, l1), n1 * 100 / a1)
        };

        let mut bucket_sizes = vec![0usize; buckets].into_boxed_slice();
        let mut entries = Vec::with_capacity(n);
        for key in keys {
            let bucket = reduce(g(key, conf.seed), buckets, conf.nodiv);
            bucket_sizes[bucket] += 1;
            entries.push((bucket, key));
        }

        // Largest buckets are resolved first, while the table is still
        // sparse; the trailing key order makes any duplicate pair adjacent.
        entries.sort_unstable_by(|a, b|
            bucket_sizes[b.0].cmp(&bucket_sizes[a.0])
                .then_with(|| b.0.cmp(&a.0))
                .then_with(|| a.1.cmp(&b.1)));
        if entries.windows(2).any(|w| w[0].1 == w[1].1) { return None; }

        let mut taken = Box::<[u64]>::with_zeroed_bits(range);
        let mut trial = Box::<[u64]>::with_zeroed_bits(range);
        let mut displacements = vec![0u32; buckets].into_boxed_slice();
        let mut d_max = 0u32;

        let mut run_begin = 0;
        while run_begin < n {
            let bucket = entries[run_begin].0;
            let run = &entries[run_begin..run_begin + bucket_sizes[bucket]];
            let mut d = 0u32;
            'search: loop {
                d += 1;
                for &(_, key) in run {
                    let slot = reduce(f(d, key, conf.seed), range, conf.nodiv);
                    if taken.get_bit(slot) || trial.get_bit(slot) {
                        // recomputing the slots keeps the cleanup
                        // proportional to the bucket size
                        for &(_, placed) in run {
                            trial.clear_bit(reduce(f(d, placed, conf.seed), range, conf.nodiv));
                        }
                        continue 'search;
                    }
                    trial.set_bit(slot);
                }
                break;
            }
            // commit; the bucket's trial bits coincide with the committed
            // ones and do not disturb later buckets
            for &(_, key) in run {
                taken.set_bit(reduce(f(d, key, conf.seed), range, conf.nodiv));
            }
            displacements[bucket] = d;
            d_max = d_max.max(d);
            stats.bucket(run.len(), d);
            run_begin += run.len();
        }
        stats.end(d_max);

        Some(Self {
            displacements: Displacements::U32(displacements),
            seed: conf.seed,
            buckets,
            range,
            nodiv: conf.nodiv,
            d_max,
        })
    }

    /// Constructs [`Function`] for the given `keys`, using the build
    /// configuration `conf`.
    ///
    /// The keys must be distinct; [`None`] is returned otherwise.
    #[inline]
    pub fn try_with_conf<K: Lanes + Ord>(keys: &[K], conf: BuildConf) -> Option<Self> {
        Self::try_with_conf_stats(keys, conf, &mut ())
    }

    /// Constructs [`Function`] for the given `keys`, using the build
    /// configuration `conf` and reporting construction events to `stats`.
    ///
    /// Panics if `keys` contains duplicates; deduplicate first, e.g. with
    /// [`uniq`](crate::uniq).
    pub fn with_conf_stats<K, BS>(keys: &[K], conf: BuildConf, stats: &mut BS) -> Self
        where K: Lanes + Ord, BS: BuildStatsCollector
    {
        Self::try_with_conf_stats(keys, conf, stats)
            .expect("Constructing chd::Function failed. The input contains duplicate keys.")
    }

    /// Constructs [`Function`] for the given `keys`, using the build
    /// configuration `conf`. Panics if `keys` contains duplicates.
    #[inline]
    pub fn with_conf<K: Lanes + Ord>(keys: &[K], conf: BuildConf) -> Self {
        Self::with_conf_stats(keys, conf, &mut ())
    }

    /// Constructs [`Function`] for the given `keys` with the default
    /// configuration. Panics if `keys` contains duplicates.
    #[inline]
    pub fn new<K: Lanes + Ord>(keys: &[K]) -> Self {
        Self::with_conf(keys, Default::default())
    }
}

impl<K: Lanes + Ord> From<&[K]> for Function {
    fn from(keys: &[K]) -> Self {
        Self::new(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::uniq;

    /// Asserts that `phf` maps every key to a distinct value in `[0, range)`.
    fn test_phf<K: Lanes + std::fmt::Debug>(keys: &[K], phf: &Function) {
        let mut seen = Box::<[u64]>::with_zeroed_bits(phf.range());
        for key in keys {
            let index = phf.get(key) as usize;
            assert!(index < phf.range(),
                "PHF assigns too large value for the key {:?}: {}>={}.", key, index, phf.range());
            assert!(!seen.get_bit(index),
                "PHF assigns {} to {:?} and some other key included in the input", index, key);
            seen.set_bit(index);
        }
    }

    struct XorShift64(u64);

    impl Iterator for XorShift64 {
        type Item = u64;
        fn next(&mut self) -> Option<u64> {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            Some(self.0)
        }
    }

    #[test]
    fn test_tiny_int_set() {
        let keys = [1u32, 2, 3, 4, 5];
        let h = Function::with_conf(&keys, BuildConf::seed(0xdeadbeef));
        assert_eq!(h.buckets(), 2);
        assert_eq!(h.range(), 6);
        test_phf(&keys, &h);
    }

    #[test]
    fn test_pow2_mode() {
        let keys = [1u32, 2, 3, 4, 5];
        let div = Function::with_conf(&keys, BuildConf::seed(0xdeadbeef));
        let h = Function::with_conf(&keys,
            BuildConf { nodiv: true, ..BuildConf::seed(0xdeadbeef) });
        assert!(h.buckets().is_power_of_two());
        assert!(h.range().is_power_of_two());
        assert!(h.range() >= div.range());
        test_phf(&keys, &h);
    }

    #[test]
    fn test_string_keys() {
        let keys = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];
        let mut h = Function::with_conf(&keys, BuildConf::seed(1));
        test_phf(&keys, &h);
        let values: Vec<u32> = keys.iter().map(|k| h.get(k)).collect();
        h.compact();
        assert!(h.element_bytes() <= 2);
        assert_eq!(values, keys.iter().map(|k| h.get(k)).collect::<Vec<u32>>());
        test_phf(&keys, &h);
    }

    #[test]
    fn test_determinism_and_seed_sensitivity() {
        let keys: Vec<u64> = XorShift64(0x1234).take(1000).collect();
        let a = Function::with_conf(&keys, BuildConf::seed(42));
        let b = Function::with_conf(&keys, BuildConf::seed(42));
        assert_eq!(a.buckets(), b.buckets());
        assert_eq!(a.range(), b.range());
        assert_eq!(a.d_max(), b.d_max());
        assert!(a.displacements == b.displacements);
        assert!(keys.iter().all(|k| a.get(k) == b.get(k)));
        let c = Function::with_conf(&keys, BuildConf::seed(43));
        assert!(keys.iter().any(|k| a.get(k) != c.get(k)));
    }

    #[test]
    fn test_input_order_invariance() {
        let mut keys: Vec<u64> = XorShift64(0xabcdef).take(500).collect();
        let a = Function::with_conf(&keys, BuildConf::seed(7));
        let swaps: Vec<u64> = XorShift64(3).take(keys.len()).collect();
        let len = keys.len();
        for (i, s) in swaps.iter().enumerate() {
            keys.swap(i, *s as usize % len);
        }
        let b = Function::with_conf(&keys, BuildConf::seed(7));
        assert_eq!(a.d_max(), b.d_max());
        assert!(a.displacements == b.displacements);
        assert!(keys.iter().all(|k| a.get(k) == b.get(k)));
    }

    #[test]
    fn test_empty_and_single() {
        let empty = Function::new(&[] as &[u32]);
        assert_eq!(empty.buckets(), 1);
        assert_eq!(empty.range(), 1);
        assert_eq!(empty.d_max(), 0);

        let single = Function::with_conf(&[7u32], BuildConf::seed(5));
        assert_eq!(single.d_max(), 1);
        assert!((single.get(&7u32) as usize) < single.range());
    }

    #[test]
    fn test_single_bucket_stress() {
        // every key in one bucket and a full table stress the retry loop
        let keys: Vec<u32> = (0..8u32).map(|i| i.wrapping_mul(2654435761)).collect();
        let h = Function::with_conf(&keys,
            BuildConf { lambda: 8, alpha: 100, seed: 3, ..Default::default() });
        assert_eq!(h.buckets(), 1);
        assert_eq!(h.range(), keys.len());
        test_phf(&keys, &h);
    }

    #[test]
    fn test_minimal() {
        let keys: Vec<u32> = (0..1000).collect();
        let h = Function::with_conf(&keys,
            BuildConf { alpha: 100, seed: 11, ..Default::default() });
        assert_eq!(h.range(), keys.len());
        test_phf(&keys, &h);
    }

    #[test]
    fn test_degenerate_parameters_are_clamped() {
        let keys = [10u64, 20, 30];
        let h = Function::with_conf(&keys,
            BuildConf { lambda: 0, alpha: 0, seed: 2, ..Default::default() });
        assert_eq!(h.buckets(), keys.len());        // lambda clamped to 1
        assert_eq!(h.range(), keys.len() * 100);    // alpha clamped to 1
        test_phf(&keys, &h);
    }

    #[test]
    fn test_build_stats_events() {
        struct Recorder { sizes: Vec<usize>, keys_placed: usize, d_max: u32 }

        impl BuildStatsCollector for Recorder {
            fn bucket(&mut self, bucket_size: usize, displacement: u32) {
                self.sizes.push(bucket_size);
                self.keys_placed += bucket_size;
                self.d_max = self.d_max.max(displacement);
            }
            fn end(&mut self, d_max: u32) { assert_eq!(d_max, self.d_max); }
        }

        let keys: Vec<u32> = (0..100).collect();
        let mut recorder = Recorder { sizes: Vec::new(), keys_placed: 0, d_max: 0 };
        let h = Function::with_conf_stats(&keys, BuildConf::seed(8), &mut recorder);
        assert_eq!(recorder.keys_placed, keys.len());
        assert!(recorder.sizes.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(recorder.d_max, h.d_max());
    }

    #[test]
    fn test_uniq_precondition() {
        let mut keys = [3u32, 1, 4, 1, 5, 9, 2, 6, 5, 3];
        assert!(Function::try_with_conf(&keys, Default::default()).is_none());
        let unique = uniq(&mut keys);
        assert_eq!(unique, 7);
        let h = Function::new(&keys[..unique]);
        test_phf(&keys[..unique], &h);
    }

    #[test]
    #[should_panic(expected = "duplicate")]
    fn test_duplicates_panic() {
        Function::new(&[1u32, 2, 1]);
    }

    #[test]
    fn test_read_write() {
        let keys: Vec<u64> = XorShift64(99).take(200).collect();
        let mut h = Function::with_conf(&keys,
            BuildConf { nodiv: true, ..BuildConf::seed(5) });
        h.compact();
        let mut buff = Vec::new();
        h.write(&mut buff).unwrap();
        assert_eq!(buff.len(), h.write_bytes());
        let read = Function::read(&mut &buff[..]).unwrap();
        assert!(read.displacements == h.displacements);
        assert_eq!(read.nodiv(), h.nodiv());
        assert!(keys.iter().all(|k| read.get(k) == h.get(k)));
    }

    #[test]
    fn test_medium_random_set() {
        let keys: Vec<u64> = XorShift64(0x0ddc0ffe).take(100_000).collect();
        for nodiv in [false, true] {
            let mut h = Function::with_conf(&keys,
                BuildConf { nodiv, ..BuildConf::seed(0x5eed) });
            if nodiv {
                assert!(h.buckets().is_power_of_two());
                assert!(h.range().is_power_of_two());
            }
            assert!(h.range() >= keys.len());
            test_phf(&keys, &h);
            h.compact();
            assert!(h.element_bytes() <= 2);
            test_phf(&keys, &h);
        }
    }

    #[test]
    #[ignore = "takes much time"]
    fn test_large_random_set() {
        let keys: Vec<u64> = XorShift64(0xdeadbeef).take(1_000_000).collect();
        let mut h = Function::with_conf(&keys, BuildConf::seed(0x5eed));
        test_phf(&keys, &h);
        h.compact();
        assert!(h.element_bytes() <= 2);
        test_phf(&keys, &h);
    }
}
