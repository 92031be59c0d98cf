//! End-to-end scenarios from spec.md §8, exercised against the public
//! `ProjectCache` API the way `cli/check.rs`/`cli/build.rs` use it.

use rsc::cache::ProjectCache;
use std::path::Path;
use tempfile::tempdir;

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn single_proc_compiles_with_no_diagnostics() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.rs2", "[proc,main]() { return; }");

    let mut cache = ProjectCache::new();
    let diagnostics = cache.full_diff(dir.path()).unwrap();

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(cache.stats.files_compiled, 1);
}

#[test]
fn caller_callee_cross_file_dependency_is_recorded() {
    let dir = tempdir().unwrap();
    write(dir.path(), "callee.rs2", "[proc,greet](string $name)(string) { return(\"hi\"); }");
    write(dir.path(), "caller.rs2", "[proc,main]() { ~greet(\"a\"); }");

    let mut cache = ProjectCache::new();
    let diagnostics = cache.full_diff(dir.path()).unwrap();

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert!(cache.symbols().lookup_script("proc", "greet").is_some());
    assert!(cache.symbols().lookup_script("proc", "main").is_some());
}

#[test]
fn signature_change_fans_out_to_callers_with_an_arity_diagnostic() {
    let dir = tempdir().unwrap();
    write(dir.path(), "callee.rs2", "[proc,add](int $a, int $b)(int) { return(1); }");
    write(dir.path(), "caller.rs2", "[proc,main]() { ~add(1, 2); }");

    let mut cache = ProjectCache::new();
    assert!(cache.full_diff(dir.path()).unwrap().is_empty());

    // Drop `add` to a single parameter; `main`'s call site is now wrong arity.
    write(dir.path(), "callee.rs2", "[proc,add](int $a)(int) { return(1); }");
    let diagnostics = cache.full_diff(dir.path()).unwrap();

    assert!(
        diagnostics.iter().any(|d| d.diagnostic.message.contains("expects 1 argument")),
        "{diagnostics:?}"
    );
}

#[test]
fn signature_preserving_edit_never_touches_the_caller() {
    let dir = tempdir().unwrap();
    write(dir.path(), "callee.rs2", "[proc,add](int $a, int $b)(int) { return(1); }");
    write(dir.path(), "caller.rs2", "[proc,main]() { ~add(1, 2); }");

    let mut cache = ProjectCache::new();
    cache.full_diff(dir.path()).unwrap();
    let compiled_before = cache.stats.files_compiled;

    // Body-only edit: same trigger/name/params/return type.
    write(dir.path(), "callee.rs2", "[proc,add](int $a, int $b)(int) { return(2); }");
    cache.full_diff(dir.path()).unwrap();

    // Only callee.rs2 recompiles; caller.rs2's CRC is unchanged so it's
    // skipped and fan-out never reaches it.
    assert_eq!(cache.stats.files_compiled, compiled_before + 1);
}

#[test]
fn cyclic_dependents_each_recompile_exactly_once() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.rs2", "[proc,a](int $x)() { ~b(1); }");
    write(dir.path(), "b.rs2", "[proc,b](int $x)() { ~a(1); }");

    let mut cache = ProjectCache::new();
    assert!(cache.full_diff(dir.path()).unwrap().is_empty());

    write(dir.path(), "a.rs2", "[proc,a](int $x, int $y)() { ~b(1); }");
    let before = cache.stats.files_compiled;
    let diagnostics = cache.full_diff(dir.path()).unwrap();

    // a.rs2 itself plus exactly one fan-out pass over b.rs2 — not an
    // infinite loop back through a.rs2 via the a<->b cycle.
    assert_eq!(cache.stats.files_compiled, before + 2);
    assert!(
        diagnostics.iter().any(|d| d.diagnostic.message.contains("expects 2 argument")),
        "{diagnostics:?}"
    );
}

#[test]
fn persisted_cache_round_trips_through_disk() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.rs2", "[proc,main](int $x)() { return; }");

    let mut cache = ProjectCache::new();
    cache.full_diff(dir.path()).unwrap();

    let cache_file = dir.path().join(".rsc-cache");
    std::fs::write(&cache_file, cache.persist()).unwrap();

    let bytes = std::fs::read(&cache_file).unwrap();
    let restored = ProjectCache::load(&bytes).unwrap();
    let info = restored.symbols().lookup_script("proc", "main").unwrap();
    assert_eq!(info.params.len(), 1);
}

#[test]
fn single_file_recompile_fans_out_to_callers_without_a_directory_walk() {
    let dir = tempdir().unwrap();
    write(dir.path(), "callee.rs2", "[proc,add](int $a, int $b)(int) { return(1); }");
    write(dir.path(), "caller.rs2", "[proc,main]() { ~add(1, 2); }");

    let mut cache = ProjectCache::new();
    assert!(cache.full_diff(dir.path()).unwrap().is_empty());

    let callee_path = dir.path().join("callee.rs2");
    write(dir.path(), "callee.rs2", "[proc,add](int $a)(int) { return(1); }");
    let new_bytes = std::fs::read(&callee_path).unwrap();
    let diagnostics = cache.recompile(&callee_path, &new_bytes).unwrap();

    assert!(
        diagnostics.iter().any(|d| d.diagnostic.message.contains("expects 1 argument")),
        "{diagnostics:?}"
    );
}

#[test]
fn deleted_file_drops_its_declarations_on_next_diff() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.rs2", "[proc,main]() { return; }");

    let mut cache = ProjectCache::new();
    cache.full_diff(dir.path()).unwrap();
    assert!(cache.symbols().lookup_script("proc", "main").is_some());

    std::fs::remove_file(dir.path().join("a.rs2")).unwrap();
    cache.full_diff(dir.path()).unwrap();
    assert!(cache.symbols().lookup_script("proc", "main").is_none());
}
