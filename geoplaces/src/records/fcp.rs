//! Per-country cache file of filtered, joined city records.
//!
//! After a successful build, a country's record set is materialized as a
//! text file next to the validator token the upstream served it under. A
//! later incarnation of the same country server reads the file back instead
//! of repeating the download when the token is still current or the file is
//! younger than the staleness threshold.
//!
//! Format: one header line `fcp<TAB>etag<TAB>rfc3339-timestamp`, then one
//! tab-separated record per line. Writes go to a sibling temp file first and
//! are renamed into place, so readers never observe a partial file.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::CityRecord;

/// Magic tag of the header line.
const HEADER_TAG: &str = "fcp";

/// Column count of a record line.
const RECORD_COLUMNS: usize = 11;

/// Cache-file errors.
#[derive(Debug, thiserror::Error)]
pub enum FcpError {
    #[error("cache file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid cache file at line {line}: {message}")]
    InvalidFormat { line: usize, message: String },
}

/// Header of a country cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FcpHeader {
    /// Validator token the upstream served the source ZIP under.
    pub etag: String,
    /// When the token was recorded. Authoritative for staleness; the file's
    /// mtime is ignored.
    pub fetched_at: DateTime<Utc>,
}

/// Path of the cache file for a country code within the data directory.
pub fn fcp_path(data_dir: &Path, country_code: &str) -> PathBuf {
    data_dir.join(format!("{}.fcp", country_code.to_uppercase()))
}

/// Reader/writer for country cache files.
pub struct FcpFile;

impl FcpFile {
    /// Read only the header, or `None` if the file does not exist.
    pub fn read_header(path: &Path) -> Result<Option<FcpHeader>, FcpError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FcpError::Io(e)),
        };

        let mut first = String::new();
        BufReader::new(file).read_line(&mut first)?;
        Ok(Some(parse_header(first.trim_end())?))
    }

    /// Read the header and every record.
    pub fn read(path: &Path) -> Result<(FcpHeader, Vec<CityRecord>), FcpError> {
        let file = fs::File::open(path)?;
        let mut lines = BufReader::new(file).lines().enumerate();

        let header = match lines.next() {
            Some((_, line)) => parse_header(line?.trim_end())?,
            None => {
                return Err(FcpError::InvalidFormat {
                    line: 1,
                    message: "empty cache file".to_string(),
                })
            }
        };

        let mut records = Vec::new();
        for (number, line) in lines {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            records.push(parse_record(number + 1, &line)?);
        }

        Ok((header, records))
    }

    /// Write header and records atomically (temp file + rename).
    pub fn write(
        path: &Path,
        header: &FcpHeader,
        records: &[CityRecord],
    ) -> Result<(), FcpError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("fcp.tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            writeln!(
                writer,
                "{}\t{}\t{}",
                HEADER_TAG,
                header.etag,
                header.fetched_at.to_rfc3339()
            )?;
            for record in records {
                writeln!(
                    writer,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    record.name,
                    record.lat,
                    record.lng,
                    record.feature_class,
                    record.feature_code,
                    record.country_code,
                    record.admin1,
                    record.admin2,
                    record.admin3,
                    record.admin4,
                    record.timezone,
                )?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn parse_header(line: &str) -> Result<FcpHeader, FcpError> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() != 3 || columns[0] != HEADER_TAG {
        return Err(FcpError::InvalidFormat {
            line: 1,
            message: "missing fcp header".to_string(),
        });
    }

    let fetched_at = DateTime::parse_from_rfc3339(columns[2])
        .map_err(|e| FcpError::InvalidFormat {
            line: 1,
            message: format!("bad header timestamp: {}", e),
        })?
        .with_timezone(&Utc);

    Ok(FcpHeader {
        etag: columns[1].to_string(),
        fetched_at,
    })
}

fn parse_record(line: usize, row: &str) -> Result<CityRecord, FcpError> {
    let columns: Vec<&str> = row.split('\t').collect();
    if columns.len() != RECORD_COLUMNS {
        return Err(FcpError::InvalidFormat {
            line,
            message: format!(
                "expected {} columns, found {}",
                RECORD_COLUMNS,
                columns.len()
            ),
        });
    }

    let coord = |field: &str, value: &str| -> Result<f64, FcpError> {
        value.parse().map_err(|_| FcpError::InvalidFormat {
            line,
            message: format!("unparseable {} {:?}", field, value),
        })
    };

    let mut feature_class = columns[3].chars();
    let class = match (feature_class.next(), feature_class.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(FcpError::InvalidFormat {
                line,
                message: format!("invalid feature class {:?}", columns[3]),
            })
        }
    };

    Ok(CityRecord {
        name: columns[0].to_string(),
        lat: coord("latitude", columns[1])?,
        lng: coord("longitude", columns[2])?,
        feature_class: class,
        feature_code: columns[4].to_string(),
        country_code: columns[5].to_string(),
        admin1: columns[6].to_string(),
        admin2: columns[7].to_string(),
        admin3: columns[8].to_string(),
        admin4: columns[9].to_string(),
        timezone: columns[10].to_string(),
    })
}
