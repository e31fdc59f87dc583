use anyhow::bail;
use std::path::Path;
use vigil_engine::approval::{ApprovalGate, ApprovalStatus};

pub fn run(root: &Path, goal_id: &str, approved: bool) -> anyhow::Result<()> {
    let gate = ApprovalGate::new(root);
    match gate.decide(goal_id, approved)? {
        Some(req) => {
            let verdict = match req.status {
                ApprovalStatus::Approved => "approved",
                ApprovalStatus::Rejected => "rejected",
                ApprovalStatus::Pending => "pending",
            };
            println!("{verdict}: {} ({})", req.title, req.goal_id);
            Ok(())
        }
        None => bail!("no approval request found for goal '{goal_id}'"),
    }
}
