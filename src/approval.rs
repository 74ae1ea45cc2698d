use crate::ui;
use anyhow::{Result, bail};
use devlink::ApprovalCallback;
use log::info;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Operator answers to a per-device diff prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Commit the diff for the current device only
    ApproveSingle,
    /// Abort the commit for the current device only
    RejectSingle,
    /// Commit this diff for the current device and all later devices with
    /// the same diff
    ApproveAll,
    /// Abort this diff for the current device and all later devices with
    /// the same diff
    RejectAll,
}

impl ApprovalStatus {
    /// The word the operator types for this status.
    pub fn answer(&self) -> &'static str {
        match self {
            Self::ApproveSingle => "yes",
            Self::RejectSingle => "no",
            Self::ApproveAll => "all",
            Self::RejectAll => "none",
        }
    }

    /// Parse an operator answer.
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim() {
            "yes" => Some(Self::ApproveSingle),
            "no" => Some(Self::RejectSingle),
            "all" => Some(Self::ApproveAll),
            "none" => Some(Self::RejectAll),
            _ => None,
        }
    }
}

/// Diffs approved or rejected for every device with the same change.
///
/// Keys are content hashes of the diff text; a diff cannot move between the
/// approved and rejected sets once decided.
#[derive(Debug, Default)]
pub struct DiffStore {
    approved: HashSet<String>,
    rejected: HashSet<String>,
}

fn diff_key(diff: &str) -> String {
    blake3::hash(diff.as_bytes()).to_hex().to_string()
}

impl DiffStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve a diff for all devices having the same diff.
    pub fn approve(&mut self, diff: &str) -> Result<()> {
        let key = diff_key(diff);
        if self.approved.contains(&key) {
            return Ok(());
        }
        if self.rejected.contains(&key) {
            bail!("Diff already rejected for all devices, hence it cannot be approved.");
        }
        self.approved.insert(key);
        Ok(())
    }

    /// Reject a diff for all devices having the same diff.
    pub fn reject(&mut self, diff: &str) -> Result<()> {
        let key = diff_key(diff);
        if self.rejected.contains(&key) {
            return Ok(());
        }
        if self.approved.contains(&key) {
            bail!("Diff already approved for all devices, hence it cannot be rejected.");
        }
        self.rejected.insert(key);
        Ok(())
    }

    /// Get the stored status: `Some(true)` approved, `Some(false)` rejected,
    /// `None` undecided.
    pub fn status(&self, diff: &str) -> Option<bool> {
        let key = diff_key(diff);
        if self.rejected.contains(&key) {
            return Some(false);
        }
        if self.approved.contains(&key) {
            return Some(true);
        }
        None
    }
}

/// Ask the operator to approve the diff for one device.
///
/// Requires a TTY. After two invalid answers the commit is aborted.
pub fn ask_approval(fqdn: &str, diff: &str) -> devlink::Result<ApprovalStatus> {
    if !console::user_attended() {
        return Err(devlink::Error::Abort {
            message: "Not in a TTY, unable to ask for confirmation".to_string(),
        });
    }

    println!("Change for {fqdn}:");
    println!("{}", ui::color_diff(diff));
    println!(
        "Type \"{}\" or \"{}\" to commit or abort the commit for this device, \
         \"{}\" or \"{}\" to commit or abort the commit for this device and \
         all next devices with the same diff.",
        ApprovalStatus::ApproveSingle.answer(),
        ApprovalStatus::RejectSingle.answer(),
        ApprovalStatus::ApproveAll.answer(),
        ApprovalStatus::RejectAll.answer(),
    );

    for _ in 0..2 {
        let answer: String = dialoguer::Input::new()
            .with_prompt(">")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| devlink::Error::Abort {
                message: format!("Unable to read answer: {e}"),
            })?;
        if let Some(status) = ApprovalStatus::from_answer(&answer) {
            return Ok(status);
        }
        ui::warn("Invalid response. After 2 wrong answers the commit will be aborted.");
    }

    Err(devlink::Error::Abort {
        message: "Too many invalid answers, commit aborted".to_string(),
    })
}

/// Interactive approval callback backed by the shared [`DiffStore`].
pub struct InteractiveApproval {
    store: Arc<Mutex<DiffStore>>,
}

impl InteractiveApproval {
    /// Create a callback over the shared store.
    pub fn new(store: Arc<Mutex<DiffStore>>) -> Self {
        Self { store }
    }
}

impl ApprovalCallback for InteractiveApproval {
    fn approve(&mut self, fqdn: &str, diff: &str) -> devlink::Result<()> {
        let mut store = self.store.lock().expect("diff store lock poisoned");
        match store.status(diff) {
            Some(true) => {
                info!("Committing already approved change on {fqdn}");
                return Ok(());
            }
            Some(false) => {
                info!("Skipping already rejected change on {fqdn}");
                return Err(devlink::Error::Abort {
                    message: "Change rejected for all devices".to_string(),
                });
            }
            None => {}
        }

        match ask_approval(fqdn, diff)? {
            ApprovalStatus::ApproveSingle => Ok(()),
            ApprovalStatus::ApproveAll => {
                store.approve(diff).map_err(|e| devlink::Error::Abort {
                    message: e.to_string(),
                })?;
                info!("Change approved for all devices");
                Ok(())
            }
            ApprovalStatus::RejectSingle => Err(devlink::Error::Abort {
                message: "Change rejected".to_string(),
            }),
            ApprovalStatus::RejectAll => {
                store.reject(diff).map_err(|e| devlink::Error::Abort {
                    message: e.to_string(),
                })?;
                Err(devlink::Error::Abort {
                    message: "Change rejected for all devices".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_round_trip() {
        for status in [
            ApprovalStatus::ApproveSingle,
            ApprovalStatus::RejectSingle,
            ApprovalStatus::ApproveAll,
            ApprovalStatus::RejectAll,
        ] {
            assert_eq!(ApprovalStatus::from_answer(status.answer()), Some(status));
        }
        assert_eq!(ApprovalStatus::from_answer("maybe"), None);
        assert_eq!(ApprovalStatus::from_answer(" yes "), Some(ApprovalStatus::ApproveSingle));
    }

    #[test]
    fn test_store_status_transitions() {
        let mut store = DiffStore::new();
        assert_eq!(store.status("+ a"), None);

        store.approve("+ a").unwrap();
        assert_eq!(store.status("+ a"), Some(true));
        // Re-approving is a no-op.
        store.approve("+ a").unwrap();

        store.reject("+ b").unwrap();
        assert_eq!(store.status("+ b"), Some(false));
    }

    #[test]
    fn test_store_conflicts_are_errors() {
        let mut store = DiffStore::new();
        store.approve("+ a").unwrap();
        assert!(store.reject("+ a").is_err());

        store.reject("+ b").unwrap();
        assert!(store.approve("+ b").is_err());
    }

    #[test]
    fn test_stored_rejection_aborts_without_prompting() {
        let store = Arc::new(Mutex::new(DiffStore::new()));
        store.lock().unwrap().reject("+ a").unwrap();
        let mut approval = InteractiveApproval::new(Arc::clone(&store));
        let err = approval.approve("leaf1.example.com", "+ a").unwrap_err();
        assert!(matches!(err, devlink::Error::Abort { .. }));
    }

    #[test]
    fn test_stored_approval_passes_without_prompting() {
        let store = Arc::new(Mutex::new(DiffStore::new()));
        store.lock().unwrap().approve("+ a").unwrap();
        let mut approval = InteractiveApproval::new(Arc::clone(&store));
        assert!(approval.approve("leaf1.example.com", "+ a").is_ok());
    }
}
