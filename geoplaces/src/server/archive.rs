//! Extraction of the country text file from a downloaded archive.
//!
//! A geonames country archive contains the country's dump as `<CC>.txt`
//! alongside a readme; only the dump member is wanted.

use std::io::{Cursor, Read};

/// Archive extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract the named text member from ZIP bytes.
pub fn extract_member(bytes: &[u8], member: &str) -> Result<String, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut file = archive.by_name(member)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}

/// Name of the dump member inside a country archive.
pub fn dump_member_name(country_code: &str) -> String {
    format!("{}.txt", country_code.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn build_zip(members: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in members {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_dump_member() {
        let bytes = build_zip(&[
            ("readme.txt", "about this file"),
            ("GB.txt", "the dump contents"),
        ]);
        let text = extract_member(&bytes, &dump_member_name("gb")).unwrap();
        assert_eq!(text, "the dump contents");
    }

    #[test]
    fn test_missing_member_is_an_error() {
        let bytes = build_zip(&[("readme.txt", "about this file")]);
        assert!(extract_member(&bytes, "GB.txt").is_err());
    }

    #[test]
    fn test_garbage_bytes_are_an_error() {
        assert!(extract_member(b"definitely not a zip", "GB.txt").is_err());
    }
}
