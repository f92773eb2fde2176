//! Execution pipeline scenarios against the scripted network
//!
//! All tests run on paused tokio time, so poll intervals and backoff delays
//! elapse instantly.

#[cfg(test)]
mod pipeline_tests {
    use crate::classify::ErrorKind;
    use crate::codec::FieldValue;
    use crate::config::{PipelineConfig, PreconditionPolicy};
    use crate::errors::PipelineError;
    use crate::instruction::AccountRef;
    use crate::pipeline::{ConfirmationState, Execution, ExecutionPipeline};
    use crate::rpc::{RpcError, SignatureState};
    use crate::test_utils::MockRpc;
    use solana_sdk::{
        account::Account,
        pubkey::Pubkey,
        signature::{Keypair, Signer},
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            poll_interval_ms: 100,
            max_poll_attempts: 3,
            retry_budget: 2,
            precondition_policy: PreconditionPolicy::Submit,
            backoff_base_ms: 10,
            backoff_max_ms: 100,
        }
    }

    fn pipeline(rpc: &Arc<MockRpc>, config: PipelineConfig) -> ExecutionPipeline {
        ExecutionPipeline::new(rpc.clone(), Pubkey::new_unique(), config)
    }

    fn accounts(pipeline: &ExecutionPipeline, payer: &Keypair) -> Vec<AccountRef> {
        let state = pipeline
            .derive(&[b"widget", payer.pubkey().as_ref()], pipeline.program_id())
            .unwrap();
        vec![
            AccountRef::writable(state.address),
            AccountRef::writable_signer(payer.pubkey()),
        ]
    }

    fn args() -> Vec<FieldValue> {
        vec![FieldValue::from("gizmo"), FieldValue::U64(1_000_000)]
    }

    async fn run(pipeline: &ExecutionPipeline, payer: &Keypair) -> Result<Execution, PipelineError> {
        pipeline
            .execute("create_widget", accounts(pipeline, payer), &args(), payer)
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_on_first_cycle() {
        let rpc = Arc::new(MockRpc::new());
        let pipeline = pipeline(&rpc, fast_config());
        let payer = Keypair::new();

        let execution = run(&pipeline, &payer).await.unwrap();

        assert!(execution.is_confirmed());
        assert!(execution.classification().is_none());
        let result = execution.result().unwrap();
        assert_eq!(result.attempts, 1);
        assert!(matches!(result.state, ConfirmationState::Confirmed { .. }));
        assert_eq!(rpc.submit_count().await, 1);
        assert_eq!(rpc.simulate_count().await, 1);

        // The submission is re-signed over a blockhash fetched after simulation
        let simulated = rpc.simulated_blockhashes().await;
        let submitted = rpc.submitted_blockhashes().await;
        assert_ne!(simulated[0], submitted[0]);
        assert_eq!(result.signature, rpc.submitted().await[0].signatures[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_simulation_never_submits() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_failed_simulation(&[
            "Program log: Instruction: CreateWidget",
            "Program log: AnchorError occurred. Error Code: WidgetNameTooLong. Error Number: 6001.",
        ])
        .await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        match execution {
            Execution::Halted(c) => {
                assert_eq!(c.kind, ErrorKind::Fatal);
                assert!(c.excerpt.contains("WidgetNameTooLong"));
            }
            other => panic!("expected halt, got {other:?}"),
        }
        assert_eq!(rpc.submit_count().await, 0);
        assert_eq!(rpc.status_queries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_precondition_halts_when_configured() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_failed_simulation(&["Allocate: account Address { .. } already in use"])
            .await;
        let config = PipelineConfig {
            precondition_policy: PreconditionPolicy::Halt,
            ..fast_config()
        };
        let pipeline = pipeline(&rpc, config);

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.is_halted());
        assert!(execution.classification().unwrap().is_precondition());
        assert_eq!(rpc.submit_count().await, 0);
        assert_eq!(rpc.status_queries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_precondition_is_submitted_by_default() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_failed_simulation(&["Program log: AnchorError caused by account: widget. Error Code: AccountNotInitialized."])
            .await;
        rpc.push_status(SignatureState::Errored {
            slot: 77,
            reason: "InstructionError(0, Custom(3012))".to_string(),
        })
        .await;
        let pipeline = pipeline(&rpc, PipelineConfig::default());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        match &execution {
            Execution::Completed {
                result,
                precondition,
            } => {
                assert!(precondition.as_ref().unwrap().is_precondition());
                assert_eq!(
                    result.state,
                    ConfirmationState::Failed {
                        reason: "InstructionError(0, Custom(3012))".to_string()
                    }
                );
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(rpc.submit_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_is_never_retried() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_status(SignatureState::Pending).await;
        rpc.push_status(SignatureState::Errored {
            slot: 12,
            reason: "InsufficientFundsForRent { account_index: 1 }".to_string(),
        })
        .await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        let result = execution.result().unwrap();
        assert!(matches!(result.state, ConfirmationState::Failed { .. }));
        assert_eq!(result.attempts, 1);
        assert_eq!(rpc.submit_count().await, 1);
        assert_eq!(rpc.status_queries().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_with_fresh_blockhash() {
        let rpc = Arc::new(MockRpc::new());
        // First cycle exhausts its three polls and stays pending through the
        // pre-retry check and the first round of the second cycle
        rpc.push_statuses(SignatureState::Pending, 5).await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.is_confirmed());
        let result = execution.result().unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(result.signature, rpc.submitted().await[1].signatures[0]);
        let blockhashes = rpc.submitted_blockhashes().await;
        assert_eq!(blockhashes.len(), 2);
        assert_ne!(blockhashes[0], blockhashes[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_budget_is_bounded() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_never_lands(true).await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        let result = execution.result().unwrap();
        assert_eq!(result.state, ConfirmationState::TimedOut { polls: 3 });
        assert_eq!(result.attempts, 3);
        assert_eq!(rpc.submit_count().await, 3);
        // Every round re-checks the earlier submissions before the current one
        assert_eq!(rpc.status_queries().await, 3 + 1 + 3 * 2 + 2 + 3 * 3);

        let distinct: HashSet<_> = rpc.submitted_blockhashes().await.into_iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_simulation_is_retried() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_failed_simulation(&["Transaction simulation failed: Blockhash not found"])
            .await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.is_confirmed());
        assert_eq!(execution.result().unwrap().attempts, 2);
        assert_eq!(rpc.simulate_count().await, 2);
        assert_eq!(rpc.submit_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_budget_exhaustion_halts() {
        let rpc = Arc::new(MockRpc::new());
        for _ in 0..2 {
            rpc.push_failed_simulation(&["Node is behind by 150 slots"]).await;
        }
        let config = PipelineConfig {
            retry_budget: 1,
            ..fast_config()
        };
        let pipeline = pipeline(&rpc, config);

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.classification().unwrap().is_transient());
        assert!(execution.is_halted());
        assert_eq!(rpc.simulate_count().await, 2);
        assert_eq!(rpc.submit_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotent_rerun_is_precondition() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_idempotent(true).await;
        let pipeline = pipeline(&rpc, fast_config());
        let payer = Keypair::new();

        let first = run(&pipeline, &payer).await.unwrap();
        assert!(first.is_confirmed());

        let second = run(&pipeline, &payer).await.unwrap();
        let classification = second.classification().unwrap();
        assert_eq!(classification.kind, ErrorKind::Precondition);
        assert_eq!(classification.marker.as_deref(), Some("already in use"));
        assert!(matches!(
            second.result().map(|r| &r.state),
            Some(ConfirmationState::Failed { .. })
        ));
        assert_eq!(rpc.submit_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_landing_resolves_before_retry() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_idempotent(true).await;
        // Lands right after the cycle gives up on it
        rpc.push_statuses(SignatureState::Pending, 3).await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.is_confirmed());
        assert!(execution.classification().is_none());
        let result = execution.result().unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.signature, rpc.submitted().await[0].signatures[0]);
        assert_eq!(rpc.submit_count().await, 1);
        assert_eq!(rpc.simulate_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_submission_landing_during_next_poll() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_idempotent(true).await;
        // Still pending at the pre-retry check, lands during the second cycle's polls
        rpc.push_statuses(SignatureState::Pending, 4).await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        let submitted = rpc.submitted().await;
        assert_eq!(submitted.len(), 2);
        assert!(execution.is_confirmed());
        let result = execution.result().unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.signature, submitted[0].signatures[0]);
        assert!(execution.classification().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_after_submit_keeps_signature() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_status_error(RpcError::Internal("unsupported commitment".to_string()))
            .await;
        let pipeline = pipeline(&rpc, fast_config());

        let err = run(&pipeline, &Keypair::new()).await.unwrap_err();

        let sent = rpc.submitted().await[0].signatures[0];
        assert!(matches!(
            &err,
            PipelineError::Poll { signature, source: RpcError::Internal(_) } if *signature == sent
        ));
        assert_eq!(err.submitted_signature(), Some(&sent));
        assert!(!err.is_retryable());
        assert_eq!(rpc.submit_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_payer_submissions_are_serialized() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_statuses(SignatureState::Pending, 2).await;
        let pipeline = pipeline(&rpc, fast_config());
        let payer = Keypair::new();

        let a_accounts = accounts(&pipeline, &payer);
        let b_accounts = a_accounts.clone();
        let (a_args, b_args) = ([FieldValue::U8(1)], [FieldValue::U8(2)]);
        let (a, b) = tokio::join!(
            pipeline.execute("create_widget", a_accounts, &a_args, &payer),
            pipeline.execute("create_widget", b_accounts, &b_args, &payer),
        );

        assert!(a.unwrap().is_confirmed());
        assert!(b.unwrap().is_confirmed());
        assert_eq!(rpc.submit_count().await, 2);
        assert_eq!(rpc.max_in_flight().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_payers_submit_concurrently() {
        let rpc = Arc::new(MockRpc::new());
        let pipeline = pipeline(&rpc, fast_config());
        let (alice, bob) = (Keypair::new(), Keypair::new());

        let (a, b) = tokio::join!(run(&pipeline, &alice), run(&pipeline, &bob));

        assert!(a.unwrap().is_confirmed());
        assert!(b.unwrap().is_confirmed());
        assert_eq!(rpc.max_in_flight().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_submit_error_consumes_budget() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_submit_error(RpcError::RateLimited {
            endpoint: "mock".to_string(),
        })
        .await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.is_confirmed());
        assert_eq!(execution.result().unwrap().attempts, 2);
        assert_eq!(rpc.simulate_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_submit_error_is_returned() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_submit_error(RpcError::Internal("invalid transaction".to_string()))
            .await;
        let pipeline = pipeline(&rpc, fast_config());

        let err = run(&pipeline, &Keypair::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Rpc(RpcError::Internal(_))));
        assert_eq!(rpc.simulate_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_poll_errors_keep_polling() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_status_error(RpcError::Timeout {
            endpoint: "mock".to_string(),
            timeout_ms: 100,
        })
        .await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.is_confirmed());
        assert_eq!(execution.result().unwrap().attempts, 1);
        assert_eq!(rpc.status_queries().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blockhash_fetch_is_retried_inside_cycle() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_blockhash_error(RpcError::Transport {
            endpoint: "mock".to_string(),
            message: "connection reset".to_string(),
        })
        .await;
        let pipeline = pipeline(&rpc, fast_config());

        let execution = run(&pipeline, &Keypair::new()).await.unwrap();

        assert!(execution.is_confirmed());
        assert_eq!(execution.result().unwrap().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_only_never_submits() {
        let rpc = Arc::new(MockRpc::new());
        rpc.push_failed_simulation(&["Program log: Error: insufficient funds"])
            .await;
        let pipeline = pipeline(&rpc, fast_config());
        let payer = Keypair::new();

        let descriptor = pipeline
            .builder()
            .build("withdraw", accounts(&pipeline, &payer), &[FieldValue::U64(5)])
            .unwrap();
        assert_eq!(descriptor.args(), &5u64.to_le_bytes());
        let dry_run = pipeline.simulate_only(descriptor, &payer, &[]).await.unwrap();

        assert!(!dry_run.outcome.succeeded);
        assert!(dry_run.classification.unwrap().is_precondition());
        assert_eq!(rpc.submit_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoding_error_surfaces_before_network() {
        let rpc = Arc::new(MockRpc::new());
        let pipeline = pipeline(&rpc, fast_config());
        let payer = Keypair::new();
        let mixed = FieldValue::List(vec![FieldValue::U8(1), FieldValue::Bool(true)]);

        let err = pipeline
            .execute("create_widget", accounts(&pipeline, &payer), &[mixed], &payer)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Codec(_)));
        assert_eq!(rpc.simulate_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_signer_is_reported() {
        let rpc = Arc::new(MockRpc::new());
        let pipeline = pipeline(&rpc, fast_config());
        let payer = Keypair::new();
        let authority = Keypair::new();
        let accounts = vec![
            AccountRef::writable_signer(payer.pubkey()),
            AccountRef::readonly_signer(authority.pubkey()),
        ];

        let err = pipeline
            .execute("rotate_authority", accounts.clone(), &[], &payer)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Signing(_)));

        let execution = pipeline
            .execute_with_signers("rotate_authority", accounts, &[], &payer, &[&authority])
            .await
            .unwrap();
        assert!(execution.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_derivations_and_account_lookups() {
        let rpc = Arc::new(MockRpc::new());
        let pipeline = pipeline(&rpc, fast_config());
        let payer = Keypair::new();

        let first = accounts(&pipeline, &payer);
        let second = accounts(&pipeline, &payer);
        assert_eq!(first, second);
        assert_eq!(pipeline.deriver().cache_len(), 1);

        let state = first[0].address;
        assert!(!pipeline.account_exists(&state).await.unwrap());
        rpc.insert_account(state, Account::new(1_000_000, 64, pipeline.program_id()))
            .await;
        assert!(pipeline.account_exists(&state).await.unwrap());
    }
}
