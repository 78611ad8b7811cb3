use tracing::{error, info};

use crate::users::{
    error::UserError,
    repo::UserRepo,
    repo_types::NewUser,
};

/// A demo account inserted by the seed script.
#[derive(Debug, Clone, Copy)]
pub struct DemoAccount {
    pub username: &'static str,
    pub password: Option<&'static str>,
    pub private_key: Option<&'static str>,
    pub node_id: &'static str,
}

impl DemoAccount {
    fn to_new_user(self) -> NewUser {
        NewUser {
            username: self.username.to_owned(),
            password: self.password.map(str::to_owned),
            private_key: self.private_key.map(str::to_owned),
            node_id: self.node_id.to_owned(),
        }
    }
}

pub const DEMO_ACCOUNTS: &[DemoAccount] = &[
    DemoAccount {
        username: "NetRunner_42",
        password: Some("password123"),
        private_key: None,
        node_id: "node-42abc1",
    },
    DemoAccount {
        username: "CyberPunk",
        password: None,
        private_key: Some("secure-private-key-example"),
        node_id: "node-3b9c2d",
    },
    DemoAccount {
        username: "ShadowRunner",
        password: Some("shadow123"),
        private_key: None,
        node_id: "node-5e7f3a",
    },
    DemoAccount {
        username: "GhostInTheShell",
        password: None,
        private_key: Some("ghost-private-key-example"),
        node_id: "node-1d4e8c",
    },
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Insert each account that is not there yet. A failing account is logged
/// and recorded; the remaining ones are still attempted.
pub async fn seed_accounts(repo: &UserRepo, accounts: &[DemoAccount]) -> SeedReport {
    let mut report = SeedReport::default();

    for account in accounts {
        match repo.find_by_username(account.username).await {
            Ok(Some(_)) => {
                info!(username = account.username, "user already exists");
                report.skipped.push(account.username.to_owned());
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, username = account.username, "error creating user");
                report.failed.push(account.username.to_owned());
                continue;
            }
        }

        match repo.create(&account.to_new_user()).await {
            Ok(user) => {
                info!(username = %user.username, user_id = %user.id, "created user");
                report.created.push(user.username);
            }
            // Lost a race with another writer; the account exists now.
            Err(UserError::DuplicateUsername(_)) => {
                info!(username = account.username, "user already exists");
                report.skipped.push(account.username.to_owned());
            }
            Err(e) => {
                error!(error = %e, username = account.username, "error creating user");
                report.failed.push(account.username.to_owned());
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn demo_accounts_are_unique() {
        let names: HashSet<_> = DEMO_ACCOUNTS.iter().map(|a| a.username).collect();
        let nodes: HashSet<_> = DEMO_ACCOUNTS.iter().map(|a| a.node_id).collect();
        assert_eq!(names.len(), DEMO_ACCOUNTS.len());
        assert_eq!(nodes.len(), DEMO_ACCOUNTS.len());
    }

    #[test]
    fn every_demo_account_can_log_in() {
        for a in DEMO_ACCOUNTS {
            assert!(
                a.password.is_some() || a.private_key.is_some(),
                "{} has neither password nor key",
                a.username
            );
        }
        assert!(DEMO_ACCOUNTS.iter().any(|a| a.password.is_some()));
        assert!(DEMO_ACCOUNTS.iter().any(|a| a.private_key.is_some()));
    }

    #[test]
    fn conversion_keeps_plaintext_for_hashing() {
        let user = DEMO_ACCOUNTS[0].to_new_user();
        assert_eq!(user.username, "NetRunner_42");
        assert_eq!(user.password.as_deref(), Some("password123"));
        assert!(user.private_key.is_none());
        assert_eq!(user.node_id, "node-42abc1");
    }
}
