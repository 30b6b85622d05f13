//! HTTP tiers and the ladder against a local mock server.

use std::path::Path;
use std::time::Duration;

use albumdex::config::{FetchConfig, RetryConfig};
use albumdex::fetcher::{
    BlockClassifier, ChallengeTier, DebugArtifacts, DirectTier, FetchLadder, FetchOptions,
    FetchOutcome, FetchTier, Pacer, ResponseCache, Tier, TierRequest,
};
use tempfile::TempDir;
use wiremock::matchers::{header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gallery_page() -> String {
    format!(
        "<html><head><title>Gallery</title></head><body>{}</body></html>",
        "<div class=\"album\">photo</div>".repeat(200)
    )
}

fn ladder(tiers: Vec<Box<dyn FetchTier>>, cache: ResponseCache, dir: &Path) -> FetchLadder {
    FetchLadder::new(
        tiers,
        cache,
        DebugArtifacts::new(dir.join("debug")),
        BlockClassifier::default(),
        Pacer::immediate(),
        RetryConfig::default(),
    )
}

#[tokio::test]
async fn test_direct_tier_sends_accept_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/posts"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let tier = DirectTier::new(&FetchConfig::immediate()).unwrap();
    let request = TierRequest {
        accept: Some("application/json"),
        extra_headers: &[],
    };
    let response = tier
        .attempt(&format!("{}/api/posts", server.uri()), &request)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "[]");
}

#[tokio::test]
async fn test_direct_tier_reports_status() {
    let server = MockServer::start().await;
    Mock::given(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let tier = DirectTier::new(&FetchConfig::immediate()).unwrap();
    let response = tier
        .attempt(&format!("{}/gone", server.uri()), &TierRequest::default())
        .await
        .unwrap();
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_challenge_tier_follows_meta_refresh_with_cookie() {
    let server = MockServer::start().await;
    let interstitial = r#"<html><head><title>Just a moment...</title>
        <meta http-equiv="refresh" content="1; url=/album/1?cleared=1"></head>
        <body>Checking your browser</body></html>"#;

    Mock::given(path("/album/1"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("set-cookie", "clearance=ok; Path=/")
                .set_body_string(interstitial),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/album/1"))
        .and(header("cookie", "clearance=ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery_page()))
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let tier = ChallengeTier::new(&FetchConfig::immediate()).unwrap();
    let response = tier
        .attempt(&format!("{}/album/1", server.uri()), &TierRequest::default())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.contains("class=\"album\""));
}

#[tokio::test]
async fn test_challenge_tier_solves_script_challenge() {
    let server = MockServer::start().await;
    let challenge = r#"<html><head><title>Just a moment...</title></head>
<body>
<form id="challenge-form" action="/cdn-cgi/l/chk_jschl" method="get">
  <input type="hidden" name="jschl_vc" value="9a8b7c"/>
  <input type="hidden" id="jschl-answer" name="jschl_answer"/>
</form>
<script>
  setTimeout(function () {
    var a = document.getElementById('jschl-answer');
    a.value = (+((!+[] + !![] + []) + (+!![] + !![] + !![] + !![] + !![])) - 4) * 2;
    document.cookie = "cf_chl=solved; path=/";
    document.getElementById('challenge-form').submit();
  }, 4000);
</script>
</body></html>"#;

    Mock::given(method("GET"))
        .and(path("/album/2"))
        .respond_with(ResponseTemplate::new(503).set_body_string(challenge))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn-cgi/l/chk_jschl"))
        .and(query_param("jschl_vc", "9a8b7c"))
        .and(query_param("jschl_answer", "42"))
        .and(header_regex("cookie", "cf_chl=solved"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/album/2")
                .insert_header("set-cookie", "cf_clearance=granted; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/album/2"))
        .and(header_regex("cookie", "cf_clearance=granted"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery_page()))
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;

    let tier = ChallengeTier::new(&FetchConfig::immediate()).unwrap();
    let response = tier
        .attempt(&format!("{}/album/2", server.uri()), &TierRequest::default())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.contains("class=\"album\""));
}

#[tokio::test]
async fn test_challenge_tier_gives_up_on_unsolvable_script() {
    let server = MockServer::start().await;
    let challenge = r#"<html><head><title>Just a moment...</title></head>
<body>
<form id="challenge-form" action="/verify"><input id="answer" name="answer"/></form>
<script>document.getElementById('answer').value = window.crypto.subtle.digest();</script>
</body></html>"#;
    Mock::given(path("/album/3"))
        .respond_with(ResponseTemplate::new(503).set_body_string(challenge))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery_page()))
        .expect(0)
        .mount(&server)
        .await;

    let tier = ChallengeTier::new(&FetchConfig::immediate()).unwrap();
    let response = tier
        .attempt(&format!("{}/album/3", server.uri()), &TierRequest::default())
        .await
        .unwrap();
    assert_eq!(response.status, 503);
}

#[tokio::test]
async fn test_ladder_serves_fresh_cache_without_request() {
    let server = MockServer::start().await;
    Mock::given(path("/a/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery_page()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = ResponseCache::new(dir.path().join("cache"), Duration::from_secs(3600));
    let tier = DirectTier::new(&FetchConfig::immediate()).unwrap();
    let ladder = ladder(vec![Box::new(tier)], cache, dir.path());
    let url = format!("{}/a/abc", server.uri());

    let first = ladder
        .fetch_outcome(&url, "erome", "abc", &FetchOptions::html())
        .await;
    assert!(matches!(
        first,
        FetchOutcome::Fetched { tier: Some(Tier::Direct), from_cache: false, .. }
    ));

    let second = ladder
        .fetch_outcome(&url, "erome", "abc", &FetchOptions::html())
        .await;
    assert!(matches!(second, FetchOutcome::Fetched { from_cache: true, .. }));
}

#[tokio::test]
async fn test_ladder_refetches_expired_cache() {
    let server = MockServer::start().await;
    Mock::given(path("/a/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery_page()))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = ResponseCache::new(dir.path().join("cache"), Duration::ZERO);
    let tier = DirectTier::new(&FetchConfig::immediate()).unwrap();
    let ladder = ladder(vec![Box::new(tier)], cache, dir.path());
    let url = format!("{}/a/abc", server.uri());

    for _ in 0..2 {
        let content = ladder.fetch(&url, "erome", "abc", &FetchOptions::html()).await;
        assert!(content.is_some());
    }
}

#[tokio::test]
async fn test_ladder_saves_block_page_and_gives_up() {
    let server = MockServer::start().await;
    Mock::given(path("/blocked"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html>Attention Required! | Cloudflare</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let tier = DirectTier::new(&FetchConfig::immediate()).unwrap();
    let ladder = ladder(vec![Box::new(tier)], ResponseCache::disabled(), dir.path());

    let outcome = ladder
        .fetch_outcome(
            &format!("{}/blocked", server.uri()),
            "fapello",
            "blocked",
            &FetchOptions::html(),
        )
        .await;

    assert_eq!(outcome, FetchOutcome::Unavailable);
    assert!(ladder.debug_artifacts().path_for("fapello", "blocked").exists());
}

#[tokio::test]
async fn test_ladder_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let tier = DirectTier::new(&FetchConfig::immediate()).unwrap();
    let ladder = ladder(vec![Box::new(tier)], ResponseCache::disabled(), dir.path());

    let outcome = ladder
        .fetch_outcome(
            &format!("{}/missing", server.uri()),
            "kemono",
            "",
            &FetchOptions::json(),
        )
        .await;
    assert_eq!(outcome, FetchOutcome::NotFound);
}
