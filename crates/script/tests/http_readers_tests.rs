use std::sync::Arc;

use csm_dashboard_scripts::beacon_api::BeaconApiClient;
use csm_dashboard_scripts::ipfs_logs::IpfsLogClient;
use csm_dashboard_scripts::lido_api::LidoApiClient;
use csm_dashboard_scripts::rewards_tree::{CachedRewardsTreeReader, ReqwestRewardsTreeReader, RewardsTreeReader};
use csm_dashboard_shared::csm::{NodeOperatorId, ValidatorStatus};
use mockito::{Matcher, Server};
use std::time::Duration;

mod test_utils;
use test_utils::{init_logging, metrics, TIMEOUT};

const TREE_JSON: &str = r#"{
    "CSM Operator 0": {"cumulativeFeeShares": 98765432109876543210123, "proof": []},
    "CSM Operator 12": {"cumulativeFeeShares": 5, "proof": ["0x1111111111111111111111111111111111111111111111111111111111111111"]},
    "tree_root": "0x00"
}"#;

fn pubkey_hex(byte: u8) -> String {
    format!("0x{}", hex::encode([byte; 48]))
}

mod rewards_tree {
    use super::*;

    #[tokio::test]
    async fn fetches_and_parses_tree() {
        init_logging();
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/proofs.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TREE_JSON)
            .create_async()
            .await;

        let metrics = metrics();
        let reader = ReqwestRewardsTreeReader::new(
            &format!("{}/proofs.json", server.url()),
            TIMEOUT,
            Arc::clone(&metrics.services.rewards_tree),
        )
        .unwrap();

        let tree = reader.read_tree().await.unwrap();
        assert_eq!(tree.operator_ids(), vec![NodeOperatorId(0), NodeOperatorId(12)]);
        assert_eq!(
            tree.get(NodeOperatorId(0)).unwrap().cumulative_fee_shares,
            98765432109876543210123
        );
        assert_eq!(tree.get(NodeOperatorId(12)).unwrap().proof.len(), 1);
        mock.assert_async().await;

        let calls = metrics
            .services
            .rewards_tree
            .call_count
            .with_label_values(&["read_tree"])
            .get();
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server.mock("GET", "/proofs.json").with_status(503).create_async().await;

        let metrics = metrics();
        let reader = ReqwestRewardsTreeReader::new(
            &format!("{}/proofs.json", server.url()),
            TIMEOUT,
            Arc::clone(&metrics.services.rewards_tree),
        )
        .unwrap();

        assert!(reader.read_tree().await.is_err());
        let errors = metrics
            .services
            .rewards_tree
            .error_count
            .with_label_values(&["read_tree"])
            .get();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn cached_reader_hits_network_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/proofs.json")
            .with_status(200)
            .with_body(TREE_JSON)
            .expect(1)
            .create_async()
            .await;

        let metrics = metrics();
        let reader = CachedRewardsTreeReader::new(
            ReqwestRewardsTreeReader::new(
                &format!("{}/proofs.json", server.url()),
                TIMEOUT,
                Arc::clone(&metrics.services.rewards_tree),
            )
            .unwrap(),
            Duration::from_secs(3600),
        );

        for _ in 0..3 {
            assert_eq!(reader.read_tree().await.unwrap().len(), 2);
        }
        mock.assert_async().await;
    }
}

mod beacon_api {
    use super::*;

    #[tokio::test]
    async fn maps_validators_in_request_order() {
        let mut server = Server::new_async().await;
        let path = format!("/validator/{},{}", pubkey_hex(1), pubkey_hex(2));
        let body = format!(
            r#"{{"status": "OK", "data": {{"pubkey": "{}", "validatorindex": 77, "status": "active_online",
                "balance": 32010000000, "effectivebalance": 32000000000, "slashed": false,
                "activationepoch": 250000, "exitepoch": 9223372036854775807}}}}"#,
            pubkey_hex(2)
        );
        let mock = server
            .mock("GET", path.as_str())
            .match_query(Matcher::UrlEncoded("apikey".into(), "secret".into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let metrics = metrics();
        let client = BeaconApiClient::new(
            &format!("{}/", server.url()),
            Some("secret".to_owned()),
            TIMEOUT,
            Arc::clone(&metrics.services.beacon_api),
        )
        .unwrap();

        let validators = client.get_validators_by_pubkeys(&[[1u8; 48], [2u8; 48]]).await.unwrap();
        mock.assert_async().await;

        assert_eq!(validators.len(), 2);
        assert_eq!(validators[0].pubkey, [1u8; 48]);
        assert_eq!(validators[0].status, ValidatorStatus::Unknown("unknown".to_owned()));
        assert_eq!(validators[1].index, Some(77));
        assert_eq!(validators[1].status, ValidatorStatus::ActiveOnline);
        assert_eq!(validators[1].activation_epoch, Some(250000));
        assert_eq!(validators[1].exit_epoch, None);
    }

    #[tokio::test]
    async fn batches_large_requests() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/validator/0x".to_owned()))
            .with_status(200)
            .with_body(r#"{"status": "OK", "data": []}"#)
            .expect(2)
            .create_async()
            .await;

        let metrics = metrics();
        let client =
            BeaconApiClient::new(&server.url(), None, TIMEOUT, Arc::clone(&metrics.services.beacon_api)).unwrap();

        let pubkeys: Vec<[u8; 48]> = (0..150u8).map(|i| [i; 48]).collect();
        let validators = client.get_validators_by_pubkeys(&pubkeys).await.unwrap();
        assert_eq!(validators.len(), 150);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_input_makes_no_requests() {
        let metrics = metrics();
        let client =
            BeaconApiClient::new("http://127.0.0.1:9", None, TIMEOUT, Arc::clone(&metrics.services.beacon_api))
                .unwrap();
        assert!(client.get_validators_by_pubkeys(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_status_fails() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status": "ERROR: rate limited", "data": null}"#)
            .create_async()
            .await;

        let metrics = metrics();
        let client =
            BeaconApiClient::new(&server.url(), None, TIMEOUT, Arc::clone(&metrics.services.beacon_api)).unwrap();
        assert!(client.get_validators_by_pubkeys(&[[1u8; 48]]).await.is_err());
    }
}

mod lido_api {
    use super::*;

    #[tokio::test]
    async fn reads_sma_apr() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/protocol/steth/apr/sma")
            .with_status(200)
            .with_body(r#"{"data": {"aprs": [{"timeUnix": 1, "apr": 2.9}], "smaApr": 2.95}, "meta": {"chainId": 1}}"#)
            .create_async()
            .await;

        let metrics = metrics();
        let client = LidoApiClient::new(&server.url(), TIMEOUT, Arc::clone(&metrics.services.lido_api)).unwrap();
        assert_eq!(client.get_steth_apr().await.unwrap(), 2.95);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_payload_fails() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/protocol/steth/apr/sma")
            .with_status(200)
            .with_body(r#"{"data": {}}"#)
            .create_async()
            .await;

        let metrics = metrics();
        let client = LidoApiClient::new(&server.url(), TIMEOUT, Arc::clone(&metrics.services.lido_api)).unwrap();
        assert!(client.get_steth_apr().await.is_err());
    }
}

mod ipfs_logs {
    use super::*;

    #[tokio::test]
    async fn history_skips_failed_logs_and_keeps_order() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/ipfs/QmFirst")
            .with_status(200)
            .with_body(r#"{"frame": [100, 6400], "operators": {"5": {"distributed": 1000}}}"#)
            .expect(1)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/ipfs/QmBroken")
            .with_status(504)
            .create_async()
            .await;
        let _absent = server
            .mock("GET", "/ipfs/QmAbsent")
            .with_status(200)
            .with_body(r#"{"frame": [6401, 12700], "operators": {"6": {"distributed": 1}}}"#)
            .create_async()
            .await;
        let _last = server
            .mock("GET", "/ipfs/QmLast")
            .with_status(200)
            .with_body(r#"[{"frame": [12701, 19000], "operators": {"5": {"distributed_rewards": 2000}}}]"#)
            .create_async()
            .await;

        let metrics = metrics();
        let client = IpfsLogClient::new(&server.url(), TIMEOUT, 16, Arc::clone(&metrics.services.ipfs)).unwrap();
        let cids: Vec<String> = ["QmFirst", "QmBroken", "QmAbsent", "QmLast"]
            .into_iter()
            .map(String::from)
            .collect();

        let frames = client.get_operator_history(NodeOperatorId(5), &cids).await;
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0].start_epoch, frames[0].distributed_shares), (100, 1000));
        assert_eq!((frames[1].end_epoch, frames[1].distributed_shares), (19000, 2000));

        // immutable content: the second pass is served from cache
        client.get_operator_history(NodeOperatorId(5), &cids[..1]).await;
        first.assert_async().await;
    }
}
