use std::fs;

use loopcarve_core::{
    ExportMode, ExportOptions, OutputKind, OutputTarget, SyntheticEngine, build_manifest,
    fixtures::demo_loop, read_manifest, run_export, write_manifest,
};

fn export_demo(dir: &std::path::Path) -> loopcarve_core::ExportManifest {
    let input = dir.join("amen.loop.json");
    fs::write(
        &input,
        demo_loop().to_container().expect("loop should serialize"),
    )
    .expect("input should be writable");
    let engine = SyntheticEngine::new();
    let target = OutputTarget::resolve(&input, dir);
    let options = ExportOptions {
        mode: ExportMode::LoopWithOt,
        ..ExportOptions::default()
    };

    let outcome = run_export(&engine, &input, &target, &options).expect("export should succeed");
    build_manifest(&input, &outcome).expect("manifest should build")
}

#[test]
fn manifest_lists_every_written_file_with_its_digest() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let manifest = export_demo(temp.path());

    assert_eq!(manifest.input, "amen.loop.json");
    assert_eq!(manifest.outputs.len(), 3);
    let kinds: Vec<OutputKind> = manifest.outputs.iter().map(|entry| entry.kind).collect();
    assert_eq!(
        kinds,
        vec![OutputKind::LoopWav, OutputKind::Report, OutputKind::Ot]
    );
    for entry in &manifest.outputs {
        let bytes = fs::read(temp.path().join(&entry.file_name)).expect("listed file exists");
        assert_eq!(entry.size_bytes, bytes.len() as u64);
        assert_eq!(entry.sha256.len(), 64);
    }
}

#[test]
fn identical_exports_produce_identical_manifests() {
    let first = tempfile::tempdir().expect("tempdir should work");
    let second = tempfile::tempdir().expect("tempdir should work");

    assert_eq!(export_demo(first.path()), export_demo(second.path()));
}

#[test]
fn manifest_round_trips_through_json() {
    let temp = tempfile::tempdir().expect("tempdir should work");
    let manifest = export_demo(temp.path());
    let path = temp.path().join("meta/amen.manifest.json");

    write_manifest(&path, &manifest).expect("manifest should be written");
    let loaded = read_manifest(&path).expect("manifest should parse");

    assert_eq!(loaded, manifest);
}
