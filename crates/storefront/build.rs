//! Build script for storefront crate.
//!
//! Generates content-based hashes for static assets (CSS and the shared
//! script) so templates can reference immutable, cache-busted copies.

use std::env;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hashed assets: path below `static/`, file extension, and the env var that
/// carries the hash.
const ASSETS: [(&str, &str, &str); 2] = [
    ("css/main", "css", "CSS_HASH"),
    ("js/app", "js", "JS_HASH"),
];

fn main() {
    let manifest_dir =
        env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set by Cargo");
    let static_dir = Path::new(&manifest_dir).join("static");

    for (stem, ext, var) in ASSETS {
        hash_asset(&static_dir, stem, ext, var);
    }
}

/// Hash `static/<stem>.<ext>` and copy it to `static/<dir>/derived/` with the
/// hash in the file name.
///
/// Sets `var` for use with `env!`. A missing file yields an empty hash.
fn hash_asset(static_dir: &Path, stem: &str, ext: &str, var: &str) {
    let source = static_dir.join(format!("{stem}.{ext}"));
    println!("cargo:rerun-if-changed={}", source.display());

    let content = match fs::read(&source) {
        Ok(content) => content,
        Err(e) => {
            println!("cargo:warning=Could not read {}: {e}", source.display());
            println!("cargo:rustc-env={var}=");
            return;
        }
    };

    // First 8 hex chars of SHA-256
    let hash = format!("{:x}", Sha256::digest(&content));
    let short_hash = &hash[..8];
    println!("cargo:rustc-env={var}={short_hash}");

    let Some(parent) = source.parent() else {
        return;
    };
    let name = Path::new(stem)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("asset");
    let derived_dir = parent.join("derived");
    fs::create_dir_all(&derived_dir).expect("Failed to create derived asset directory");
    fs::copy(&source, derived_dir.join(format!("{name}.{short_hash}.{ext}")))
        .expect("Failed to copy asset to derived directory");
}
