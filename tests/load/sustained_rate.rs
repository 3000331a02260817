//! Sustained arrival-rate accuracy
//!
//! Runs the shipped scenario shape (50 req/s, pool capped at 100 VUs) for a
//! shortened duration against a mock target with realistic latency and checks:
//! - achieved request rate stays within 2% of the configured rate
//! - no iterations are dropped while the pool has headroom
//! - a target slower than maxVUs can absorb drops iterations instead of
//!   slowing the arrival rate

use arrival_loadgen::config::Config;
use arrival_loadgen::TestRun;
use figment::providers::{Format, Toml};
use figment::Figment;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn target(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(delay))
        .mount(&server)
        .await;
    server
}

fn scenario(url: &str, duration: &str, max_vus: u64) -> Config {
    let toml = format!(
        r#"
        [target]
        url = "{url}/"

        [output]
        report_interval_secs = 5

        [scenarios.constant_request_rate]
        executor = "constant-arrival-rate"
        rate = 50
        timeUnit = "1s"
        duration = "{duration}"
        preAllocatedVUs = 10
        maxVUs = {max_vus}
        "#
    );
    Config::from_figment(Figment::new().merge(Toml::string(&toml))).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_fifty_per_second_for_thirty_seconds() {
    let server = target(Duration::from_millis(80)).await;
    let run = TestRun::new(scenario(&server.uri(), "30s", 100)).unwrap();

    let summary = run.execute(CancellationToken::new()).await.unwrap();

    println!("{}", summary.render_text());
    assert_eq!(summary.iterations.count, 1_500);
    assert_eq!(summary.dropped_iterations.count, 0);
    assert!(
        (summary.http_reqs.rate - 50.0).abs() < 1.0,
        "achieved rate {:.2}/s",
        summary.http_reqs.rate
    );
    // 80ms responses at 20ms spacing keep roughly four VUs busy
    assert!(summary.vus_max <= 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_saturated_pool_drops_instead_of_slowing() {
    // 2s responses need ~100 VUs at 50/s; cap the pool at 40
    let server = target(Duration::from_secs(2)).await;
    let run = TestRun::new(scenario(&server.uri(), "10s", 40)).unwrap();

    let summary = run.execute(CancellationToken::new()).await.unwrap();

    println!("{}", summary.render_text());
    assert_eq!(summary.vus_max, 40);
    assert!(summary.dropped_iterations.count > 0);
    assert_eq!(
        summary.iterations.count + summary.dropped_iterations.count,
        500,
        "every scheduled start is either run or dropped"
    );
}
