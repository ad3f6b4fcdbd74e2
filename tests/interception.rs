mod support;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

use demo_metrics::activation::Activation;
use demo_metrics::config::{DomainFlags, PagePatterns};
use demo_metrics::{
    Domain, InterceptionController, OutboundRequest, OutboundResponse, OutboundSlot, Upstream,
};
use support::{body, count, engine, rows, same_upstream, url, MockBackend};

fn setup(backend: &Arc<MockBackend>) -> (Arc<OutboundSlot>, Arc<InterceptionController>) {
    let upstream: Arc<dyn Upstream> = backend.clone();
    let slot = Arc::new(OutboundSlot::new(upstream));
    let controller = Arc::new(InterceptionController::new(slot.clone(), engine()));
    (slot, controller)
}

async fn get(slot: &OutboundSlot, path: &str) -> OutboundResponse {
    slot.send(OutboundRequest::get(url(path)))
        .await
        .expect("response")
}

fn backend_data() -> Arc<MockBackend> {
    MockBackend::new(|request| {
        let payload = if request.url.contains("/news/campaigns/ranking") {
            json!({
                "data": [
                    { "campaignId": "c1", "name": "Launch" },
                    { "campaignId": "c2", "name": "Townhall" }
                ],
                "total": 2
            })
        } else if request.url.contains("/news/campaigns/c1/posts") {
            json!({
                "data": [
                    { "postId": "p1", "title": "Kickoff" },
                    { "postId": "p2", "title": "Recap" },
                    { "postId": "p3", "title": "Q&A" }
                ],
                "total": 3
            })
        } else if request.url.contains("/news/campaigns/c1/stats") {
            json!({ "campaignId": "c1", "name": "Launch" })
        } else if request.url.contains("/news/posts/") {
            json!({ "title": "Post" })
        } else {
            json!({ "echo": request.url })
        };
        Ok(OutboundResponse::json(StatusCode::OK, &payload))
    })
}

#[tokio::test]
async fn install_and_revert_restore_the_original() {
    let backend = MockBackend::echo();
    let (slot, controller) = setup(&backend);
    let original = slot.current().await;

    assert!(controller.install().await);
    assert!(!controller.install().await);
    assert!(controller.is_installed());
    let wrapped = slot.current().await;
    assert!(!same_upstream(&wrapped, &original));
    assert_eq!(wrapped.describe(), "intercepting(mock)");

    assert!(controller.revert().await);
    assert!(same_upstream(&slot.current().await, &original));
    assert!(!controller.is_installed());
    assert!(!controller.revert().await);
}

#[tokio::test]
async fn revert_handle_undoes_the_install() {
    let backend = MockBackend::echo();
    let (slot, controller) = setup(&backend);
    let original = slot.current().await;
    let handle = controller.revert_handle();

    controller.install().await;
    assert!(handle.revert().await);
    assert!(same_upstream(&slot.current().await, &original));
    assert!(!handle.revert().await);
}

#[tokio::test]
async fn unrelated_calls_pass_through() {
    let backend = MockBackend::echo();
    let (slot, controller) = setup(&backend);
    controller.install().await;

    let response = get(&slot, "/api/v1/users/me").await;

    assert_eq!(backend.calls(), 1);
    assert!(!response.is_synthesized());
    assert_eq!(body(&response)["echo"], url("/api/v1/users/me"));
}

#[tokio::test]
async fn fabricated_calls_never_reach_the_backend() {
    let backend = MockBackend::echo();
    let (slot, controller) = setup(&backend);
    controller.install().await;

    let overview = get(&slot, "/api/v1/analytics/news/overview").await;
    let series = get(&slot, "/api/v1/analytics/news/timeseries").await;

    assert_eq!(backend.calls(), 0);
    assert!(overview.is_synthesized());
    assert_eq!(overview.status, StatusCode::OK);
    let overview = body(&overview);
    let series = body(&series);
    assert_eq!(count(&series["totals"], "visits"), count(&overview, "visits"));
}

#[tokio::test]
async fn failed_backend_calls_answer_an_empty_payload() {
    let failing = MockBackend::new(|_| {
        Ok(OutboundResponse::json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "error": "boom" }),
        ))
    });
    let (slot, controller) = setup(&failing);
    controller.install().await;

    let response = get(&slot, "/api/v1/analytics/news/campaigns/ranking").await;
    assert_eq!(failing.calls(), 1);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body(&response), json!({ "data": [], "total": 0 }));

    let unreachable = MockBackend::new(|_| Err("connection refused".to_string()));
    let (slot, controller) = setup(&unreachable);
    controller.install().await;

    let response = get(&slot, "/api/v1/analytics/newsletters/n1/stats").await;
    assert!(response.is_synthesized());
    let payload = body(&response);
    assert_eq!(payload["newsletterId"], "n1");
    assert_eq!(payload["opens"], 0);
}

#[tokio::test]
async fn unknown_shapes_follow_the_endpoint_fallback() {
    let odd = MockBackend::new(|request| {
        if request.url.contains("/stats") {
            Ok(OutboundResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: b"<html>maintenance</html>".to_vec(),
            })
        } else {
            Ok(OutboundResponse::json(StatusCode::OK, &json!({ "items": [] })))
        }
    });
    let (slot, controller) = setup(&odd);
    controller.install().await;

    let ranking = get(&slot, "/api/v1/analytics/news/campaigns/ranking").await;
    assert!(ranking.is_synthesized());
    assert_eq!(body(&ranking), json!({ "data": [], "total": 0 }));

    let stats = get(&slot, "/api/v1/analytics/news/campaigns/c1/stats").await;
    assert!(!stats.is_synthesized());
    assert_eq!(stats.body, b"<html>maintenance</html>".to_vec());
}

#[tokio::test]
async fn non_object_details_pass_the_real_response() {
    let listy = MockBackend::new(|_| Ok(OutboundResponse::json(StatusCode::OK, &json!([1, 2, 3]))));
    let (slot, controller) = setup(&listy);
    controller.install().await;

    let stats = get(&slot, "/api/v1/analytics/news/posts/p1/stats").await;

    assert!(!stats.is_synthesized());
    assert_eq!(body(&stats), json!([1, 2, 3]));
}

#[tokio::test]
async fn augmented_ranking_agrees_with_campaign_stats() {
    let backend = backend_data();
    let (slot, controller) = setup(&backend);
    controller.install().await;

    let ranking = body(&get(&slot, "/api/v1/analytics/news/campaigns/ranking").await);
    let data = rows(&ranking);
    assert_eq!(data.len(), 2);
    assert!(count(&data[0], "visited") >= count(&data[1], "visited"));
    let c1 = data
        .iter()
        .find(|row| row["campaignId"] == "c1")
        .expect("c1 row");
    assert_eq!(c1["name"], "Launch");

    let stats = body(&get(&slot, "/api/v1/analytics/news/campaigns/c1/stats").await);
    assert_eq!(stats["name"], "Launch");
    for metric in ["potentialReach", "visited", "engaged"] {
        assert_eq!(count(&stats["stats"], metric), count(c1, metric), "{}", metric);
    }
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn post_breakdown_agrees_with_campaign_and_post_stats() {
    let backend = backend_data();
    let (slot, controller) = setup(&backend);
    controller.install().await;

    let campaign = body(&get(&slot, "/api/v1/analytics/news/campaigns/c1/stats").await);
    let posts = body(&get(&slot, "/api/v1/analytics/news/campaigns/c1/posts").await);

    let data = rows(&posts);
    assert_eq!(data.len(), 3);
    let visited: u64 = data.iter().map(|row| count(row, "visited")).sum();
    assert_eq!(visited, count(&campaign["stats"], "visited"));

    let p2 = data
        .iter()
        .find(|row| row["postId"] == "p2")
        .expect("p2 row");
    assert_eq!(p2["title"], "Recap");
    let post = body(&get(&slot, "/api/v1/analytics/news/posts/p2/stats").await);
    assert_eq!(post["title"], "Post");
    assert_eq!(count(&post["stats"], "visited"), count(p2, "visited"));
    assert_eq!(count(&post["stats"], "engaged"), count(p2, "engaged"));
}

#[tokio::test]
async fn revert_forgets_the_session() {
    let backend = MockBackend::echo();
    let (slot, controller) = setup(&backend);
    controller.install().await;

    get(&slot, "/api/v1/analytics/chat/overview").await;
    assert!(!controller.engine().store().is_empty().await);

    controller.revert().await;
    assert!(controller.engine().store().is_empty().await);
}

#[tokio::test]
async fn disabled_domains_pass_through() {
    let backend = MockBackend::echo();
    let (slot, controller) = setup(&backend);
    controller.install().await;
    controller
        .set_domains([Domain::Chat].into_iter().collect::<BTreeSet<_>>())
        .await;

    let news = get(&slot, "/api/v1/analytics/news/overview").await;
    let chat = get(&slot, "/api/v1/analytics/chat/overview").await;

    assert!(!news.is_synthesized());
    assert!(chat.is_synthesized());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn navigation_installs_and_reverts() {
    let backend = MockBackend::echo();
    let (slot, controller) = setup(&backend);
    let original = slot.current().await;
    let activation = Activation::new(controller.clone(), DomainFlags::default(), &PagePatterns::default())
        .expect("activation");

    let active = activation.navigate("https://intranet.test/news/campaigns").await;
    assert!(active.contains(&Domain::News));
    assert!(!active.contains(&Domain::Chat));
    assert!(controller.is_installed());
    assert_eq!(controller.active_domains().await, active);

    let active = activation.navigate("https://intranet.test/settings/profile").await;
    assert!(active.is_empty());
    assert!(!controller.is_installed());
    assert!(same_upstream(&slot.current().await, &original));

    activation.navigate("https://intranet.test/chat").await;
    assert!(controller.is_installed());
    assert_eq!(
        activation.page_url().await.as_deref(),
        Some("https://intranet.test/chat")
    );

    let active = activation.update_flags(DomainFlags::none()).await;
    assert!(active.is_empty());
    assert!(!controller.is_installed());
    assert!(!activation.flags().await.chat);
}

#[tokio::test]
async fn flags_alone_decide_before_any_navigation() {
    let backend = MockBackend::echo();
    let (_slot, controller) = setup(&backend);
    let flags = DomainFlags {
        pages: false,
        ..DomainFlags::default()
    };
    let activation =
        Activation::new(controller.clone(), flags, &PagePatterns::default()).expect("activation");

    let active = activation.evaluate().await;

    assert_eq!(active.len(), 3);
    assert!(!active.contains(&Domain::Pages));
    assert!(controller.is_installed());
}
