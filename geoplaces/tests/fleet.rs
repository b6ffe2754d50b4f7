//! Fleet integration tests: a real country manager driven end to end
//! against a mock upstream.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use geoplaces::catalog::Country;
use geoplaces::config::Settings;
use geoplaces::index::SearchQuery;
use geoplaces::manager::{
    CommandError, CountryManager, CountryStatusView, ManagerHandle, ServerStatus, SortColumn,
    SortDirection,
};
use geoplaces::store::{DocumentStore, JsonFileStore};
use geoplaces::upstream::{GeonamesClient, UpstreamError, ZipDownload};

// ============================================================================
// Mock upstream
// ============================================================================

/// In-memory stand-in for the geonames download server.
#[derive(Clone, Default)]
struct MockUpstream {
    /// ZIP bytes served per country code.
    archives: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    /// Remaining forced failures per country code.
    failures: Arc<Mutex<HashMap<String, u32>>>,
    /// Validator tokens reported per country code.
    etags: Arc<Mutex<HashMap<String, String>>>,
    /// Artificial latency before every download answer.
    delay: Arc<Mutex<Duration>>,
    /// Total download attempts observed.
    downloads: Arc<AtomicU32>,
}

impl MockUpstream {
    fn serve_archive(&self, code: &str, bytes: Vec<u8>) {
        self.archives
            .lock()
            .unwrap()
            .insert(code.to_string(), bytes);
    }

    fn fail_next(&self, code: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(code.to_string(), times);
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn download_count(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl GeonamesClient for MockUpstream {
    async fn head_etag(&self, country_code: &str) -> Result<Option<String>, UpstreamError> {
        Ok(self.etags.lock().unwrap().get(country_code).cloned())
    }

    async fn fetch_zip(&self, country_code: &str) -> Result<ZipDownload, UpstreamError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.downloads.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(country_code) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(UpstreamError::Status {
                        status: 500,
                        url: format!("mock://{}.zip", country_code),
                    });
                }
            }
        }

        let archive = self.archives.lock().unwrap().get(country_code).cloned();
        match archive {
            Some(bytes) => Ok(ZipDownload {
                bytes,
                etag: self.etags.lock().unwrap().get(country_code).cloned(),
            }),
            None => Err(UpstreamError::Status {
                status: 404,
                url: format!("mock://{}.zip", country_code),
            }),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// One 19-column geonames dump row.
fn dump_row(id: u32, name: &str, class: &str, feature: &str, population: i64) -> String {
    format!(
        "{id}\t{name}\t{name}\t\t51.5\t-0.1\t{class}\t{feature}\tGB\t\tENG\t\t\t\t{population}\t\t10\tEurope/London\t2026-01-01"
    )
}

/// A country archive holding the given dump rows under `<CC>.txt`.
fn build_archive(code: &str, rows: &[String]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("readme.txt", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(b"mock geonames dump").unwrap();
    writer
        .start_file(
            format!("{}.txt", code.to_uppercase()),
            zip::write::FileOptions::default(),
        )
        .unwrap();
    writer.write_all(rows.join("\n").as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// An archive with `count` qualifying cities.
fn archive_with_cities(code: &str, count: u32) -> Vec<u8> {
    let mut rows = vec![dump_row(1, "England", "A", "ADM1", 0)];
    for n in 0..count {
        rows.push(dump_row(100 + n, &format!("Town{n}"), "P", "PPL", 1000));
    }
    build_archive(code, &rows)
}

struct Fleet {
    handle: ManagerHandle,
    manager: tokio::task::JoinHandle<()>,
    upstream: MockUpstream,
    // Keeps the data directory alive for the test's duration.
    _data_dir: tempfile::TempDir,
}

/// Spin a manager up over the given catalog with fast retry timing.
fn fleet(catalog: Vec<Country>) -> Fleet {
    fleet_with(catalog, |_| {})
}

fn fleet_with(catalog: Vec<Country>, configure: impl FnOnce(&mut Settings)) -> Fleet {
    let data_dir = tempfile::tempdir().unwrap();
    let mut settings = Settings {
        data_dir: data_dir.path().to_path_buf(),
        retry_wait: Duration::from_millis(10),
        ..Settings::default()
    };
    configure(&mut settings);
    let upstream = MockUpstream::default();
    let store = JsonFileStore::new(data_dir.path().join("store")).unwrap();

    let (handle, manager) = CountryManager::spawn(
        catalog,
        Arc::new(settings),
        Arc::new(upstream.clone()),
        Arc::new(store),
    );

    Fleet {
        handle,
        manager,
        upstream,
        _data_dir: data_dir,
    }
}

fn europe_catalog() -> Vec<Country> {
    vec![
        Country::new("GB", "United Kingdom", "Europe"),
        Country::new("FR", "France", "Europe"),
    ]
}

async fn find(handle: &ManagerHandle, code: &str) -> CountryStatusView {
    handle
        .status()
        .await
        .expect("manager alive")
        .servers
        .into_iter()
        .find(|s| s.country_code == code)
        .expect("country in table")
}

async fn wait_for_status(
    handle: &ManagerHandle,
    code: &str,
    want: ServerStatus,
) -> CountryStatusView {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let view = find(handle, code).await;
        if view.status == want {
            return view;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {} to reach {}, currently {:?}",
            code,
            want,
            view
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[tokio::test]
async fn test_start_one_country_loads_its_cities() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 42));

    let started = fleet.handle.start("GB").await.unwrap().unwrap();
    assert_eq!(started.status, ServerStatus::Starting);

    let view = wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    assert_eq!(view.city_count, Some(42));
    assert_eq!(view.progress, 100);
    assert_eq!(view.substatus.as_deref(), Some("running"));
    assert!(view.startup_time_ms.is_some());
    assert!(view.startup_time.is_some());
    assert!(view.mem_usage.unwrap() > 0);
    assert!(!view.children.is_empty());

    let fr = find(&fleet.handle, "FR").await;
    assert_eq!(fr.status, ServerStatus::Stopped);
    assert_eq!(fr.progress, 0);
}

#[tokio::test]
async fn test_search_unions_loaded_countries_only() {
    let catalog = vec![
        Country::new("GB", "United Kingdom", "Europe"),
        Country::new("FR", "France", "Europe"),
    ];
    let fleet = fleet(catalog);
    fleet.upstream.serve_archive(
        "GB",
        build_archive(
            "GB",
            &[
                dump_row(1, "London", "P", "PPLC", 7_556_900),
                dump_row(2, "Londonderry", "P", "PPL", 83_652),
            ],
        ),
    );
    fleet.upstream.serve_archive(
        "FR",
        build_archive("FR", &[dump_row(3, "Paris", "P", "PPLC", 2_138_551)]),
    );

    fleet.handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;

    let indexes = fleet.handle.loaded_indexes().await.unwrap();
    assert_eq!(indexes.len(), 1);

    let query = SearchQuery::new("london", false, false);
    let hits: Vec<String> = indexes
        .iter()
        .flat_map(|index| index.search(&query))
        .map(|city| city.name.clone())
        .collect();
    assert_eq!(hits, vec!["London", "Londonderry"]);

    // Load the second country; the union grows.
    fleet.handle.start("FR").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "FR", ServerStatus::Started).await;
    assert_eq!(fleet.handle.loaded_indexes().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_double_start_is_an_error_and_changes_nothing() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 5));

    fleet.handle.start("GB").await.unwrap().unwrap();
    let before = wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;

    let second = fleet.handle.start("GB").await.unwrap();
    assert_eq!(second, Err(CommandError::AlreadyStarted));

    let after = find(&fleet.handle, "GB").await;
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_unknown_country_code_is_an_error() {
    let fleet = fleet(europe_catalog());
    let reply = fleet.handle.start("XX").await.unwrap();
    assert_eq!(reply, Err(CommandError::CountryServerNotFound));
}

#[tokio::test]
async fn test_retry_exhaustion_crashes_then_reset_recovers() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.fail_next("GB", 3);
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 7));

    fleet.handle.start("GB").await.unwrap().unwrap();
    let crashed = wait_for_status(&fleet.handle, "GB", ServerStatus::Crashed).await;
    assert_eq!(crashed.substatus.as_deref(), Some("retry_limit_exceeded"));
    assert_eq!(crashed.mem_usage, None);
    assert!(crashed.children.is_empty());
    assert_eq!(fleet.upstream.download_count(), 3);

    // Reset returns the record to its initial stopped shape.
    let reset = fleet.handle.reset("GB").await.unwrap().unwrap();
    assert_eq!(reset.status, ServerStatus::Stopped);
    assert_eq!(reset.progress, 0);
    assert_eq!(reset.substatus, None);

    // Reset twice is the same as once.
    let again = fleet.handle.reset("GB").await.unwrap();
    assert_eq!(again, Err(CommandError::ServerNotCrashed));
    assert_eq!(find(&fleet.handle, "GB").await, reset);

    // The next start succeeds cleanly.
    fleet.handle.start("GB").await.unwrap().unwrap();
    let view = wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    assert_eq!(view.city_count, Some(7));
}

#[tokio::test]
async fn test_two_failures_then_success_still_starts() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.fail_next("GB", 2);
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 3));

    fleet.handle.start("GB").await.unwrap().unwrap();
    let view = wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    assert_eq!(view.city_count, Some(3));
    assert_eq!(fleet.upstream.download_count(), 3);
}

#[tokio::test]
async fn test_reset_on_non_crashed_server_is_an_error() {
    let fleet = fleet(europe_catalog());
    let reply = fleet.handle.reset("FR").await.unwrap();
    assert_eq!(reply, Err(CommandError::ServerNotCrashed));
}

#[tokio::test]
async fn test_country_with_no_qualifying_cities_stops_cleanly() {
    let fleet = fleet(europe_catalog());
    // Every place is below the population threshold.
    fleet.upstream.serve_archive(
        "GB",
        build_archive("GB", &[dump_row(1, "Tiny", "P", "PPL", 12)]),
    );

    fleet.handle.start("GB").await.unwrap().unwrap();
    let view = wait_for_status(&fleet.handle, "GB", ServerStatus::Stopped).await;
    assert_eq!(view.substatus.as_deref(), Some("no_cities"));
}

#[tokio::test]
async fn test_malformed_dump_crashes_with_country_file_error() {
    let fleet = fleet(europe_catalog());
    fleet
        .upstream
        .serve_archive("GB", build_archive("GB", &["not\ta\tvalid\trow".to_string()]));

    fleet.handle.start("GB").await.unwrap().unwrap();
    let view = wait_for_status(&fleet.handle, "GB", ServerStatus::Crashed).await;
    assert_eq!(view.substatus.as_deref(), Some("country_file_error"));
}

#[tokio::test]
async fn test_garbage_archive_crashes_with_zip_error() {
    let fleet = fleet(europe_catalog());
    fleet
        .upstream
        .serve_archive("GB", b"this is not a zip archive".to_vec());

    fleet.handle.start("GB").await.unwrap().unwrap();
    let view = wait_for_status(&fleet.handle, "GB", ServerStatus::Crashed).await;
    assert_eq!(view.substatus.as_deref(), Some("country_zip_file_error"));
}

#[tokio::test]
async fn test_shutdown_returns_record_to_initial_shape() {
    let fleet = fleet(europe_catalog());
    let initial = find(&fleet.handle, "GB").await;

    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 4));
    fleet.handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;

    let stopped = fleet.handle.shutdown("GB").await.unwrap().unwrap();
    assert_eq!(stopped, initial);
}

#[tokio::test]
async fn test_fresh_cache_skips_the_download() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 9));

    fleet.handle.start("GB").await.unwrap().unwrap();
    let first = wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    assert_eq!(fleet.upstream.download_count(), 1);

    fleet.handle.shutdown("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Stopped).await;

    // Break the upstream; a fresh cache must carry the restart alone.
    fleet.upstream.fail_next("GB", 1000);
    fleet.handle.start("GB").await.unwrap().unwrap();
    let second = wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;

    assert_eq!(second.city_count, first.city_count);
    assert_eq!(fleet.upstream.download_count(), 1);
}

#[tokio::test]
async fn test_stale_cache_revalidates_with_etag() {
    // Zero staleness forces revalidation on every restart.
    let fleet = fleet_with(europe_catalog(), |settings| {
        settings.cache_staleness = Duration::ZERO;
    });
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 5));
    fleet
        .upstream
        .etags
        .lock()
        .unwrap()
        .insert("GB".to_string(), "\"v1\"".to_string());

    fleet.handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    assert_eq!(fleet.upstream.download_count(), 1);

    // Unchanged token: the cache carries the restart, no download.
    fleet.handle.shutdown("GB").await.unwrap().unwrap();
    fleet.handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    assert_eq!(fleet.upstream.download_count(), 1);

    // Changed token: the source moved, so the server downloads again.
    fleet
        .upstream
        .etags
        .lock()
        .unwrap()
        .insert("GB".to_string(), "\"v2\"".to_string());
    fleet.handle.shutdown("GB").await.unwrap().unwrap();
    fleet.handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    assert_eq!(fleet.upstream.download_count(), 2);
}

#[tokio::test]
async fn test_sort_orders_and_direction() {
    // Names chosen so name order differs from catalog order.
    let fleet = fleet(vec![
        Country::new("GB", "Great Britain", "Europe"),
        Country::new("FR", "France", "Europe"),
        Country::new("DE", "Deutschland", "Europe"),
    ]);

    let ascending = fleet
        .handle
        .sort(SortDirection::Ascending, SortColumn::CountryName)
        .await
        .unwrap();
    let codes: Vec<&str> = ascending.iter().map(|s| s.country_code.as_str()).collect();
    assert_eq!(codes, vec!["DE", "FR", "GB"]);

    let descending = fleet
        .handle
        .sort(SortDirection::Descending, SortColumn::CountryName)
        .await
        .unwrap();
    let codes: Vec<&str> = descending.iter().map(|s| s.country_code.as_str()).collect();
    assert_eq!(codes, vec!["GB", "FR", "DE"]);
}

#[tokio::test]
async fn test_sort_mem_usage_places_undefined_last_ascending() {
    let fleet = fleet(vec![
        Country::new("GB", "United Kingdom", "Europe"),
        Country::new("FR", "France", "Europe"),
        Country::new("DE", "Germany", "Europe"),
    ]);
    // Crash FR: crashed records have no mem_usage measurement.
    fleet.upstream.fail_next("FR", 3);
    fleet.handle.start("FR").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "FR", ServerStatus::Crashed).await;

    let ascending = fleet
        .handle
        .sort(SortDirection::Ascending, SortColumn::MemUsage)
        .await
        .unwrap();
    assert_eq!(ascending.last().unwrap().country_code, "FR");
    assert_eq!(ascending.last().unwrap().mem_usage, None);

    let descending = fleet
        .handle
        .sort(SortDirection::Descending, SortColumn::MemUsage)
        .await
        .unwrap();
    assert_eq!(descending.first().unwrap().country_code, "FR");
}

#[tokio::test]
async fn test_default_order_is_continent_descending_then_name() {
    let fleet = fleet(vec![
        Country::new("NZ", "New Zealand", "Oceania"),
        Country::new("GB", "United Kingdom", "Europe"),
        Country::new("FR", "France", "Europe"),
    ]);

    let snapshot = fleet.handle.status().await.unwrap();
    let codes: Vec<&str> = snapshot
        .servers
        .iter()
        .map(|s| s.country_code.as_str())
        .collect();
    assert_eq!(codes, vec!["NZ", "FR", "GB"]);
}

#[tokio::test]
async fn test_status_started_filters() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 2));

    assert!(fleet.handle.status_started().await.unwrap().is_empty());

    fleet.handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;

    let started = fleet.handle.status_started().await.unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].country_code, "GB");
}

#[tokio::test]
async fn test_trace_commands() {
    let fleet = fleet(europe_catalog());

    assert!(fleet.handle.set_trace(true).await.unwrap());
    assert!(fleet.handle.status().await.unwrap().trace);

    // Per-country trace requires a live server.
    let reply = fleet.handle.set_country_trace("GB", true).await.unwrap();
    assert_eq!(reply, Err(CommandError::NoSuchCountryServer));
    let reply = fleet.handle.set_country_trace("XX", true).await.unwrap();
    assert_eq!(reply, Err(CommandError::NoSuchCountryServer));

    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 2));
    fleet.handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;

    let view = fleet
        .handle
        .set_country_trace("GB", true)
        .await
        .unwrap()
        .unwrap();
    assert!(view.trace);
}

#[tokio::test]
async fn test_shutdown_all_mid_startup_then_terminate_drains() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.set_delay(Duration::from_secs(30));
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 2));
    fleet.upstream.serve_archive("FR", archive_with_cities("FR", 2));

    fleet.handle.start("GB").await.unwrap().unwrap();
    fleet.handle.start("FR").await.unwrap().unwrap();

    let views = fleet.handle.shutdown_all().await.unwrap();
    assert!(views.iter().all(|s| s.status == ServerStatus::Stopped));

    fleet.handle.terminate().await.unwrap();

    // The manager exits normally once the fleet is quiet.
    tokio::time::timeout(Duration::from_secs(5), fleet.manager)
        .await
        .expect("manager exits after terminate")
        .expect("manager exits cleanly");

    // No further replies are observed after the farewell.
    assert!(fleet.handle.status().await.is_err());
}

#[tokio::test]
async fn test_start_all_and_shutdown_all_round_trip() {
    let fleet = fleet(europe_catalog());
    fleet.upstream.serve_archive("GB", archive_with_cities("GB", 2));
    fleet.upstream.serve_archive("FR", archive_with_cities("FR", 3));

    fleet.handle.start_all().await.unwrap();
    wait_for_status(&fleet.handle, "GB", ServerStatus::Started).await;
    wait_for_status(&fleet.handle, "FR", ServerStatus::Started).await;

    let views = fleet.handle.shutdown_all().await.unwrap();
    assert!(views.iter().all(|s| s.status == ServerStatus::Stopped));

    // The manager stays up after shutdown_all.
    assert!(fleet.handle.status().await.is_ok());
}

#[tokio::test]
async fn test_duplicate_catalog_entries_collapse_to_one_record() {
    let fleet = fleet(vec![
        Country::new("GB", "United Kingdom", "Europe"),
        Country::new("GB", "United Kingdom again", "Europe"),
    ]);

    let snapshot = fleet.handle.status().await.unwrap();
    assert_eq!(snapshot.servers.len(), 1);
    assert_eq!(snapshot.servers[0].country_name, "United Kingdom");
}

#[tokio::test]
async fn test_startup_metadata_lands_in_document_store() {
    let data_dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        data_dir: data_dir.path().to_path_buf(),
        retry_wait: Duration::from_millis(10),
        ..Settings::default()
    };
    let upstream = MockUpstream::default();
    upstream.serve_archive("GB", archive_with_cities("GB", 6));
    let store = Arc::new(JsonFileStore::new(data_dir.path().join("store")).unwrap());

    let (handle, _manager) = CountryManager::spawn(
        vec![Country::new("GB", "United Kingdom", "Europe")],
        Arc::new(settings),
        Arc::new(upstream),
        Arc::clone(&store),
    );

    handle.start("GB").await.unwrap().unwrap();
    wait_for_status(&handle, "GB", ServerStatus::Started).await;

    let doc = store.get_document("GB").unwrap().expect("startup document");
    assert_eq!(doc["country_code"], "GB");
    assert_eq!(doc["city_count"], 6);
}
