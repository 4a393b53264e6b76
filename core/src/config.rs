//! Environment-variable configuration (§6): `SHARED_HEAP_SIZE`, `VERBOSE`,
//! `OVERSUBSCRIBED`.
//!
//! Parsed the way `Configuration::from_args` parses argv elsewhere in this
//! workspace: explicit, with descriptive `String` errors rather than a
//! panic, since a malformed value is the user's fatal-configuration
//! mistake (§7), not ours to paper over.

const DEFAULT_HEAP_BYTES: usize = 128 * 1024 * 1024;
const PAGE_SIZE: usize = 4096;

/// Runtime configuration read from the process environment at [`init()`](crate::init::init).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Page-aligned size in bytes of each rank's shared heap segment.
    pub shared_heap_size: usize,
    /// Whether to emit initialization diagnostics to stderr.
    pub verbose: bool,
    /// Whether more ranks are sharing this host than it has CPUs.
    pub oversubscribed: bool,
}

impl Config {
    /// Reads configuration from the process environment, falling back to
    /// documented defaults. `local_peers` is the number of ranks sharing
    /// this host (used to derive the `OVERSUBSCRIBED` default when the
    /// env var is unset).
    pub fn from_env(local_peers: usize) -> Result<Config, String> {
        let shared_heap_size = match std::env::var("SHARED_HEAP_SIZE") {
            Ok(raw) => parse_heap_size(&raw)?,
            Err(_) => DEFAULT_HEAP_BYTES,
        };
        let verbose = match std::env::var("VERBOSE") {
            Ok(raw) => parse_bool(&raw)?,
            Err(_) => false,
        };
        let oversubscribed = match std::env::var("OVERSUBSCRIBED") {
            Ok(raw) => parse_bool(&raw)?,
            Err(_) => {
                let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
                local_peers > cpus
            }
        };
        Ok(Config { shared_heap_size: page_align_up(shared_heap_size), verbose, oversubscribed })
    }
}

fn page_align_up(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("not a boolean: {other:?}")),
    }
}

fn parse_heap_size(raw: &str) -> Result<usize, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("max") {
        // No transport-reported segment cap to query here; fall back to a
        // generous default rather than guessing a number with no basis.
        return Ok(DEFAULT_HEAP_BYTES * 8);
    }
    let (digits, multiplier) = match raw.chars().last() {
        Some('k' | 'K') => (&raw[..raw.len() - 1], 1024),
        Some('m' | 'M') => (&raw[..raw.len() - 1], 1024 * 1024),
        Some('g' | 'G') => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        Some(_) => (raw, 1),
        None => return Err("empty SHARED_HEAP_SIZE".to_string()),
    };
    let value: usize = digits.trim().parse().map_err(|_| format!("not a size: {raw:?}"))?;
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        // SAFETY-in-spirit: tests run single-threaded per-test by cargo's
        // default harness isolation is not guaranteed, so this test only
        // checks parsing helpers directly rather than mutating the real
        // environment.
        assert_eq!(parse_heap_size("128M").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_heap_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_heap_size("512").unwrap(), 512);
        assert_eq!(parse_heap_size("max").unwrap(), DEFAULT_HEAP_BYTES * 8);
    }

    #[test]
    fn heap_size_is_page_aligned() {
        assert_eq!(page_align_up(1), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE + 1), PAGE_SIZE * 2);
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(!parse_bool("").unwrap());
        assert!(parse_bool("nope").is_err());
    }
}
