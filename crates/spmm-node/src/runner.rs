// One run: form every process's groups, check the ring end to end, release
// everything and report the topology.

use anyhow::{ensure, Result};
use tracing::{debug, info};

use spmm_fabric::{run_pool, Fabric, FabricError, Process};
use spmm_groups::{describe, shift_to_successor, DenseMatrixReplicationGroup, SparseMatrixReplicationGroup};
use spmm_types::{MatrixKind, ProcessTopology, RunConfig, TopologyReport};

use crate::options::ProgramOptions;

pub async fn run(options: &ProgramOptions) -> Result<TopologyReport> {
    let config = options.run_config()?;
    info!(
        processes = config.num_processes,
        groups = config.num_replication_groups,
        group_size = config.replication_group_size,
        algorithm = %config.algorithm,
        "forming replication groups"
    );
    debug!(
        file = %options.sparse_matrix_file.display(),
        seed = options.seed,
        exponent = options.exponent,
        print_matrix = options.print_matrix,
        print_greater_equal = options.print_greater_equal(),
        "matrix options carried for the multiplication engine"
    );

    let fabric = Fabric::new(config.num_processes);
    let outcomes = run_pool(fabric.clone(), move |process| form_and_verify(process, config)).await?;
    let processes = first_failure(outcomes)?;

    let live = fabric.live_channels();
    ensure!(live == 0, "{live} channels still held after release");
    info!(processes = processes.len(), "all channels released");

    Ok(TopologyReport {
        run_id: uuid::Uuid::new_v4().to_string(),
        algorithm: config.algorithm,
        num_processes: config.num_processes,
        num_replication_groups: config.num_replication_groups,
        replication_group_size: config.replication_group_size,
        processes,
        created_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Collect per-process results. On failure, report the process that failed
/// first rather than the peers it aborted.
fn first_failure<T>(outcomes: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(outcomes.len());
    let mut root = None;
    let mut aborted = None;
    for outcome in outcomes {
        match outcome {
            Ok(value) => values.push(value),
            Err(e) if is_abort(&e) => {
                aborted.get_or_insert(e);
            }
            Err(e) => {
                root.get_or_insert(e);
            }
        }
    }
    match root.or(aborted) {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

fn is_abort(e: &anyhow::Error) -> bool {
    e.chain()
        .any(|cause| matches!(cause.downcast_ref::<FabricError>(), Some(FabricError::Aborted { .. })))
}

async fn form_and_verify(process: Process, config: RunConfig) -> Result<ProcessTopology> {
    let mut dense = DenseMatrixReplicationGroup::of_process(&process, &config).await?;
    let mut sparse = SparseMatrixReplicationGroup::of_process(&process, &config).await?;

    // Each leader must hear its predecessor's group id.
    if let Some(received) = shift_to_successor(&sparse, &sparse.local_group_id()).await? {
        ensure!(
            received == sparse.pred_group_id(),
            "process {} expected group {} from its predecessor, got {received}",
            process.id(),
            sparse.pred_group_id()
        );
    }
    process.world().barrier().await?;

    let topology = describe(&dense, &sparse);
    sparse.free_comms()?;
    dense.free_comms()?;
    Ok(topology)
}

// ── Output ───────────────────────────────────────────────────────────────────

pub fn print_stats(report: &TopologyReport) {
    println!(
        "run {}  {}  P={}  groups={}  c={}",
        report.run_id,
        report.algorithm,
        report.num_processes,
        report.num_replication_groups,
        report.replication_group_size
    );
    for (kind, label) in [(MatrixKind::Dense, "dense"), (MatrixKind::Sparse, "sparse")] {
        for (group, members) in report.members(kind).iter().enumerate() {
            let leader = report
                .processes
                .iter()
                .find(|p| members.contains(&p.process_id))
                .map(|p| match kind {
                    MatrixKind::Dense  => p.dense.leader,
                    MatrixKind::Sparse => p.sparse.leader,
                });
            match leader {
                Some(leader) => println!("{label:<6} g{group:<4} leader {leader:<5} members {members:?}"),
                None         => println!("{label:<6} g{group:<4} (empty)"),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn options(extra: &[&str]) -> ProgramOptions {
        let base = ["spmm-node", "-f", "m.mtx", "-s", "1", "-e", "4"];
        ProgramOptions::try_parse_from(base.iter().chain(extra)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn column_a_run_reports_every_process() {
        let report = run(&options(&["-c", "3", "-n", "9"])).await.unwrap();
        assert_eq!(report.processes.len(), 9);
        assert_eq!(report.members(MatrixKind::Sparse), vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]]);
        assert_eq!(report.members(MatrixKind::Dense).len(), 9);
        assert!(report.processes.iter().all(|p| p.in_leaders_channel));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn inner_abc_run_matches_golden_layout() {
        let report = run(&options(&["-c", "3", "-n", "18", "-i"])).await.unwrap();
        assert_eq!(report.members(MatrixKind::Sparse)[1], vec![3, 9, 15]);
        assert_eq!(report.members(MatrixKind::Dense)[1], vec![3, 4, 5]);
        let leaders = report.processes.iter().filter(|p| p.in_leaders_channel).count();
        assert_eq!(leaders, 6);
        assert_eq!(report.processes[4].ring.pred_leader, 1);
    }

    #[test]
    fn root_cause_wins_over_aborted_peers() {
        let outcomes: Vec<Result<u32>> = vec![
            Err(spmm_groups::GroupError::from(FabricError::Aborted { op: "split" }).into()),
            Err(anyhow::anyhow!("process 1 expected group 0")),
            Ok(2),
        ];
        let err = first_failure(outcomes).unwrap_err();
        assert_eq!(err.to_string(), "process 1 expected group 0");

        let only_aborted: Vec<Result<u32>> = vec![Ok(0), Err(FabricError::Aborted { op: "barrier" }.into())];
        assert!(is_abort(&first_failure(only_aborted).unwrap_err()));
        assert_eq!(first_failure(vec![Ok(1), Ok(2)]).unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn invalid_shape_fails_before_forming() {
        let err = run(&options(&["-c", "2", "-n", "7"])).await.unwrap_err();
        assert!(err.to_string().contains("cannot be split"), "{err}");
    }
}
