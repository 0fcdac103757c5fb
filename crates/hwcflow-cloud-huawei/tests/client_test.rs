mod common;

use hwcflow_cloud::CloudProvider;
use hwcflow_cloud_huawei::{HuaweiProvider, convert_expected_400_err_into_404_err};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/autoscaling-api/v1/p1/scaling_group/g-1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/autoscaling-api/v1/p1/scaling_group/g-1"))
        .and(header("X-Auth-Token", "token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"scaling_group": {"scaling_group_id": "g-1"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let conf = common::config(&server);
    let client = conf.new_service_client("autoscaling", "cn-north-4").await.unwrap();
    let body = client
        .get(&client.service_url(&["scaling_group", "g-1"]))
        .await
        .unwrap();
    assert_eq!(body["scaling_group"]["scaling_group_id"], "g-1");
}

#[tokio::test]
async fn test_throttling_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let conf = common::config(&server);
    let client = conf.new_service_client("autoscaling", "cn-north-4").await.unwrap();
    let err = client
        .get(&client.service_url(&["scaling_group"]))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(429));
}

#[tokio::test]
async fn test_expected_400_translated_to_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/autoscaling-api/v1/p1/scaling_group/gone"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "AS.2007", "message": "The AS group does not exist."}
        })))
        .mount(&server)
        .await;

    let conf = common::config(&server);
    let client = conf.new_service_client("autoscaling", "cn-north-4").await.unwrap();
    let err = client
        .get(&client.service_url(&["scaling_group", "gone"]))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    let other = convert_expected_400_err_into_404_err(
        client.get(&client.service_url(&["scaling_group", "gone"])).await.unwrap_err(),
        "error.code",
        &["AS.0001"],
    );
    assert_eq!(other.status(), Some(400));

    let translated = convert_expected_400_err_into_404_err(err, "error.code", &["AS.2007"]);
    assert!(translated.is_not_found());
}

#[tokio::test]
async fn test_project_id_resolved_once_per_region() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .and(query_param("name", "cn-south-1"))
        .and(header_exists("Authorization"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"projects": [{"id": "p2", "name": "cn-south-1"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let conf = common::aksk_config(&server);
    assert_eq!(conf.project_id("cn-south-1").await.unwrap(), "p2");
    assert_eq!(conf.project_id("cn-south-1").await.unwrap(), "p2");

    let client = conf.new_service_client("drs", "cn-south-1").await.unwrap();
    assert_eq!(client.project_id(), "p2");
    assert_eq!(client.url("v3/{project_id}/jobs"), format!("{}/v3/p2/jobs", server.uri()));
}

#[tokio::test]
async fn test_unknown_project_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projects": []})))
        .mount(&server)
        .await;

    let conf = common::aksk_config(&server);
    let err = conf.project_id("ap-southeast-9").await.unwrap_err();
    assert!(err.to_string().contains("ap-southeast-9"));
}

#[tokio::test]
async fn test_check_auth_reports_lookup_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "APIGW.0301", "message": "Incorrect IAM authentication information"}
        })))
        .mount(&server)
        .await;

    let mut settings = common::aksk_config(&server).settings().clone();
    settings.project_id.clear();
    let provider = HuaweiProvider::new(hwcflow_cloud_huawei::Config::new(settings).unwrap());
    let status = provider.check_auth().await.unwrap();
    assert!(!status.authenticated);
    assert!(status.error.unwrap().contains("APIGW.0301"));
}
