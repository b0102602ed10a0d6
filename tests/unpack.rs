mod common;

use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;

use dd_headers::error::HeaderError;
use dd_headers::unpack::ArchiveUnpacker;

use common::{Fixture, build_bundle, is_empty_dir};

fn unpacker() -> ArchiveUnpacker {
    ArchiveUnpacker::new(".tar".to_string())
}

#[test]
fn discovers_bundles_by_marker_anywhere_in_name() {
    let fixture = Fixture::new();
    let download = fixture.download_loc();
    build_bundle(&download.join("a/sgpmetE13.b1.20230101.000000.tar"), &[]);
    build_bundle(&download.join("b/c/nsametC1.b1.20230101.tar.part0"), &[]);
    fs::write(download.join("order.log").as_std_path(), "done").unwrap();

    let bundles = unpacker().discover_bundles(&download).unwrap();
    let names: Vec<&str> = bundles.iter().filter_map(|path| path.file_name()).collect();
    assert_eq!(
        names,
        vec!["sgpmetE13.b1.20230101.000000.tar", "nsametC1.b1.20230101.tar.part0"]
    );
}

#[test]
fn unpack_and_discover_sorted_structural_files() {
    let fixture = Fixture::new();
    let bundle = fixture.download_loc().join("sgpmetE13.b1.20230101.000000.tar");
    build_bundle(
        &bundle,
        &[
            ("sgpmetE13.b1.20230102.000000.nc", &b"CDF"[..]),
            ("nested/sgpmetE13.b1.20230101.000000.cdf", &b"CDF"[..]),
            ("sgpmetE13.b1.20230101.000000.nc", &b"CDF"[..]),
            ("README.txt", &b"readme"[..]),
        ],
    );
    let extraction = fixture.extraction_loc();

    let unpacker = unpacker();
    unpacker.unpack(&bundle, &extraction).unwrap();
    unpacker.remove_bundle(&bundle).unwrap();
    assert!(!bundle.as_std_path().exists());

    let files = unpacker.discover_structural_files(&extraction).unwrap();
    let relative: Vec<String> = files
        .iter()
        .map(|path| path.strip_prefix(&extraction).unwrap().to_string())
        .collect();
    assert_eq!(
        relative,
        vec![
            "nested/sgpmetE13.b1.20230101.000000.cdf".to_string(),
            "sgpmetE13.b1.20230101.000000.nc".to_string(),
            "sgpmetE13.b1.20230102.000000.nc".to_string(),
        ]
    );
}

#[test]
fn unpacks_gzip_bundles() {
    let fixture = Fixture::new();
    let plain = fixture.root.join("plain.tar");
    build_bundle(&plain, &[("nsametC1.b1.20230101.000000.nc", &b"CDF"[..])]);
    let bundle = fixture.download_loc().join("nsametC1.b1.20230101.000000.tar.gz");
    fs::create_dir_all(fixture.download_loc().as_std_path()).unwrap();
    let mut encoder = GzEncoder::new(
        fs::File::create(bundle.as_std_path()).unwrap(),
        Compression::default(),
    );
    encoder
        .write_all(&fs::read(plain.as_std_path()).unwrap())
        .unwrap();
    encoder.finish().unwrap();

    let unpacker = unpacker();
    unpacker.unpack(&bundle, &fixture.extraction_loc()).unwrap();
    let files = unpacker
        .discover_structural_files(&fixture.extraction_loc())
        .unwrap();
    assert_eq!(files.len(), 1);
}

#[test]
fn corrupt_bundle_is_an_unpack_error() {
    let fixture = Fixture::new();
    let bundle = fixture.download_loc().join("sgpmetE13.b1.20230101.000000.tar");
    fs::create_dir_all(fixture.download_loc().as_std_path()).unwrap();
    fs::write(bundle.as_std_path(), vec![b'x'; 1024]).unwrap();

    let err = unpacker()
        .unpack(&bundle, &fixture.extraction_loc())
        .unwrap_err();
    assert_matches!(err, HeaderError::Unpack { .. });
    assert!(bundle.as_std_path().exists());
}

#[test]
fn empty_extraction_root_has_no_structural_files() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.extraction_loc().as_std_path()).unwrap();
    assert!(is_empty_dir(&fixture.extraction_loc()));
    assert!(
        unpacker()
            .discover_structural_files(&fixture.extraction_loc())
            .unwrap()
            .is_empty()
    );
}
