mod common;

use hwcflow_cloud::Resource;
use hwcflow_cloud_huawei::ScmCertificate;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CERT_PATH: &str = "/v3/scm/certificates/scs-1";

#[tokio::test]
async fn test_certificate_create_waits_for_payment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/scm/certificates/buy"))
        .and(body_partial_json(json!({
            "cert_brand": "GlobalSign",
            "order_number": 1,
            "is_auto_pay": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": "CS2301",
            "cert": [{"cert_id": "scs-1"}],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CERT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "scs-1", "status": "PAYING"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CERT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "scs-1",
            "status": "PAID",
            "order_id": "CS2301",
            "brand": "GlobalSign",
            "type": "OV_SSL_CERT",
            "domain_type": "MULTI_DOMAIN",
            "validity_period": 12,
            "domain_count": 5,
            "wildcard_count": 0,
            "multi_domain_type": "primary_single",
            "authentification": [{
                "record_name": "_dnsauth.example.com",
                "record_type": "TXT",
                "record_value": "2023",
                "domain": "example.com",
            }],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/scm/scs-1/tags/action"))
        .and(body_partial_json(json!({"action": "create"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/scm/scs-1/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"tags": [{"key": "env", "value": "test"}]})),
        )
        .mount(&server)
        .await;

    let conf = common::config(&server);
    let mut d = common::data(
        &ScmCertificate,
        json!({
            "cert_brand": "GlobalSign",
            "cert_type": "OV_SSL_CERT",
            "domain_type": "MULTI_DOMAIN",
            "effective_time": 1,
            "domain_numbers": 5,
            "primary_domain_type": "SINGLE_DOMAIN",
            "tags": {"env": "test"},
        }),
    );
    ScmCertificate.create(&mut d, &conf).await.unwrap();

    assert_eq!(d.id(), "scs-1");
    assert_eq!(d.get_str("status"), "PAID");
    assert_eq!(d.get_str("order_id"), "CS2301");
    assert_eq!(d.get_str("primary_domain_type"), "SINGLE_DOMAIN");
    assert_eq!(d.get_i64("domain_numbers"), 5);
    assert_eq!(d.get_str("authentification.0.record_type"), "TXT");
    assert_eq!(d.get_str("tags.env"), "test");
}

#[tokio::test]
async fn test_certificate_delete_retries_until_order_ready() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/unsubscribe", CERT_PATH)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error_code": "SCM.0016",
            "error_msg": "order is being processed",
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/unsubscribe", CERT_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unsubscribe_results": "SUCCESS"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CERT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "scs-1", "status": "DELETING"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CERT_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "SCM.0002",
            "error_msg": "certificate not found",
        })))
        .mount(&server)
        .await;

    let conf = common::config(&server);
    let mut d = common::state("scs-1", json!({}));
    ScmCertificate.delete(&mut d, &conf).await.unwrap();
}

#[tokio::test]
async fn test_certificate_delete_other_errors_are_final() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/unsubscribe", CERT_PATH)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error_code": "SCM.0001",
            "error_msg": "internal error",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let conf = common::config(&server);
    let mut d = common::state("scs-1", json!({}));
    let err = ScmCertificate.delete(&mut d, &conf).await.unwrap_err();
    assert!(err.to_string().contains("SCM.0001"));
}

#[tokio::test]
async fn test_certificate_unsubscribe_must_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/unsubscribe", CERT_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unsubscribe_results": "FAIL"})))
        .mount(&server)
        .await;

    let conf = common::config(&server);
    let mut d = common::state("scs-1", json!({}));
    let err = ScmCertificate.delete(&mut d, &conf).await.unwrap_err();
    assert!(err.to_string().contains("unsubscribe result is not SUCCESS"));
}
