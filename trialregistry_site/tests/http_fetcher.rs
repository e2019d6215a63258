use std::time::Duration;

use trialregistry_site::{
    detail_url, origin_of, FetchError, FetcherFactory, HttpFetcherFactory, PageFetcher, Url,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DETAIL_HTML: &str = r#"<html><body>
<div class="recruit-group2"><div class="box">[모집중] 건강한 성인 대상 1상 임상시험</div></div>
<ul class="tab"><li><a href='#tab2'>실시기관</a></li></ul>
<div id="tab2" style="display:none"><table><tbody><tr><td>서울대학교병원</td><td>홍길동</td></tr></tbody></table></div>
</body></html>"#;

fn factory() -> HttpFetcherFactory {
    HttpFetcherFactory::new(Duration::from_secs(5)).with_user_agent("trialharvest-tests")
}

#[tokio::test]
async fn navigate_loads_detail_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clnctest/view.do"))
        .and(query_param("clncTestSn", "202500051"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DETAIL_HTML))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let url = detail_url(&base, 202500051).unwrap();

    let mut fetcher = factory().launch().await.unwrap();
    fetcher.navigate(&url).await.unwrap();

    assert!(fetcher.wait_for_ready(Duration::from_secs(1)).await);
    assert_eq!(fetcher.current_url().unwrap(), url);
    let doc = fetcher.snapshot().unwrap();
    assert!(doc.select_first("div.recruit-group2 > div.box").is_some());
}

#[tokio::test]
async fn redirect_is_reflected_in_current_url() {
    let old_site = MockServer::start().await;
    let new_site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/clnctest/view.do"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!("{}/clnctest/view.do?clncTestSn=202499968", new_site.uri()).as_str(),
        ))
        .mount(&old_site)
        .await;
    Mock::given(method("GET"))
        .and(path("/clnctest/view.do"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DETAIL_HTML))
        .mount(&new_site)
        .await;

    let base = Url::parse(&old_site.uri()).unwrap();
    let mut fetcher = factory().launch().await.unwrap();
    fetcher
        .navigate(&detail_url(&base, 202499968).unwrap())
        .await
        .unwrap();

    let resolved = fetcher.current_url().unwrap();
    assert_eq!(origin_of(&resolved), new_site.uri());
}

#[tokio::test]
async fn error_status_is_a_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clnctest/view.do"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let mut fetcher = factory().launch().await.unwrap();
    let err = fetcher
        .navigate(&detail_url(&base, 1).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
    assert!(fetcher.current_url().is_none());
    assert!(!fetcher.wait_for_ready(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn blank_page_is_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clnctest/view.do"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let mut fetcher = factory().launch().await.unwrap();
    fetcher.navigate(&detail_url(&base, 2).unwrap()).await.unwrap();
    assert!(!fetcher.wait_for_ready(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn tab_controls_and_panels_are_found_in_markup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clnctest/view.do"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DETAIL_HTML))
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let mut fetcher = factory().launch().await.unwrap();
    fetcher.navigate(&detail_url(&base, 3).unwrap()).await.unwrap();

    assert!(fetcher.activate("실시기관").await.unwrap());
    assert!(!fetcher.activate("의약품 정보").await.unwrap());
    assert!(fetcher.force_visible("#tab2"));
    assert!(!fetcher.force_visible("#tab02"));
}

#[tokio::test]
async fn operations_before_navigation_report_no_page() {
    let mut fetcher = factory().launch().await.unwrap();
    assert!(matches!(fetcher.snapshot(), Err(FetchError::NoPage)));
    assert!(matches!(fetcher.activate("x").await, Err(FetchError::NoPage)));
    assert!(!fetcher.force_visible("body"));
}
