use assert_matches::assert_matches;

use readvault::domain::{Mate, ReadKey, SafeName, UploadField};
use readvault::error::IngestError;

#[test]
fn parse_single_end_field() {
    let field = UploadField::parse("file-12").unwrap();
    assert_eq!(
        field,
        UploadField::Read(ReadKey {
            index: 12,
            mate: None
        })
    );
}

#[test]
fn parse_mate_one_field() {
    let field = UploadField::parse("file-1-1").unwrap();
    assert_matches!(
        field,
        UploadField::Read(ReadKey {
            index: 1,
            mate: Some(Mate::First)
        })
    );
}

#[test]
fn parse_digest_for_mate() {
    let field = UploadField::parse("md5-1-2").unwrap();
    assert_matches!(
        field,
        UploadField::Checksum(ReadKey {
            index: 1,
            mate: Some(Mate::Second)
        })
    );
}

#[test]
fn non_numeric_index_is_invalid() {
    let err = UploadField::parse("file-one").unwrap_err();
    assert_matches!(err, IngestError::InvalidField(_));
}

#[test]
fn read_key_display_matches_form_suffix() {
    let key: ReadKey = "4-2".parse().unwrap();
    assert_eq!(key.to_string(), "4-2");
    let key: ReadKey = "4".parse().unwrap();
    assert_eq!(key.to_string(), "4");
}

#[test]
fn safe_name_parse_requires_canonical_form() {
    let name: SafeName = "run-one".parse().unwrap();
    assert_eq!(name.as_str(), "run-one");
    let err = "Run One".parse::<SafeName>().unwrap_err();
    assert_matches!(err, IngestError::InvalidName(_));
    assert_eq!(name.with_suffix(2).as_str(), "run-one-2");
}
