//! Volume identity: the directory name a volume's backup lands in.

use rand::Rng;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Identity file at the root of a backed-up volume.
pub const UNIQUE_ID_FILE: &str = "unique.id";
/// Used when no identity can be read or stored.
pub const DEFAULT_IDENTITY: &str = "drive";
const GENERATED_LEN: usize = 6;
const GENERATED_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Reduce `name` to a safe single path component.
///
/// Non-ASCII characters are dropped, path separators and whitespace runs
/// become `_`, anything outside `[A-Za-z0-9_.-]` is removed and leading or
/// trailing `.`/`_` are stripped. The result may be empty.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Identity of the volume mounted at `volume`.
///
/// Uses the first line of `unique.id` when it sanitizes to something
/// non-empty. Otherwise generates a fresh identity and writes it back so the
/// next backup of the same volume reuses it. Falls back to `drive` when the
/// file cannot be read or written.
pub fn resolve_identity(volume: &Path) -> String {
    match read_or_create(volume) {
        Ok(identity) if !identity.is_empty() => identity,
        Ok(_) => DEFAULT_IDENTITY.to_string(),
        Err(e) => {
            warn!(
                volume = %volume.display(),
                "Unable to generate a unique ID, using default: {}", e
            );
            DEFAULT_IDENTITY.to_string()
        }
    }
}

fn read_or_create(volume: &Path) -> io::Result<String> {
    let id_path = volume.join(UNIQUE_ID_FILE);
    if id_path.exists() {
        let mut first_line = String::new();
        BufReader::new(fs::File::open(&id_path)?).read_line(&mut first_line)?;
        let identity = secure_filename(&first_line);
        if !identity.is_empty() {
            debug!(identity = %identity, "Using stored volume identity");
            return Ok(identity);
        }
    }

    let identity = secure_filename(&generate_identity());
    fs::write(&id_path, &identity)?;
    debug!(identity = %identity, path = %id_path.display(), "Stored new volume identity");
    Ok(identity)
}

/// Six characters drawn uniformly from `[A-Z0-9]`.
pub fn generate_identity() -> String {
    let mut rng = rand::thread_rng();
    (0..GENERATED_LEN)
        .map(|_| GENERATED_CHARSET[rng.gen_range(0..GENERATED_CHARSET.len())] as char)
        .collect()
}
