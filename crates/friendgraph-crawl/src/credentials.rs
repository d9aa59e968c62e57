//! Round-robin credential rotation with revocation.

use friendgraph_core::{Credential, Error, Result};

/// Hands out credentials in round-robin order, skipping revoked ones.
///
/// Owned by the crawl coordinator; the counter only advances on the driver
/// task, so the n-th job handed a credential gets `credentials[n % K]` as
/// long as nothing has been revoked.
#[derive(Debug, Clone)]
pub struct CredentialRing {
    credentials: Vec<Credential>,
    revoked: Vec<bool>,
    counter: usize,
}

impl CredentialRing {
    pub fn new(credentials: &[Credential]) -> Result<Self> {
        if credentials.is_empty() {
            return Err(Error::Config("at least one API key is required".into()));
        }
        Ok(Self {
            credentials: credentials.to_vec(),
            revoked: vec![false; credentials.len()],
            counter: 0,
        })
    }

    /// Next usable credential, or `None` once every credential is revoked.
    pub fn next(&mut self) -> Option<Credential> {
        if self.active() == 0 {
            return None;
        }
        loop {
            let idx = self.counter % self.credentials.len();
            self.counter += 1;
            if !self.revoked[idx] {
                return Some(self.credentials[idx].clone());
            }
        }
    }

    /// Take a credential out of rotation. Returns `true` the first time.
    pub fn revoke(&mut self, credential: &Credential) -> bool {
        let mut newly = false;
        for (cred, revoked) in self.credentials.iter().zip(self.revoked.iter_mut()) {
            if cred == credential && !*revoked {
                *revoked = true;
                newly = true;
            }
        }
        newly
    }

    pub fn active(&self) -> usize {
        self.revoked.iter().filter(|r| !**r).count()
    }

    pub fn revoked(&self) -> Vec<Credential> {
        self.credentials
            .iter()
            .zip(&self.revoked)
            .filter(|(_, r)| **r)
            .map(|(c, _)| c.clone())
            .collect()
    }
}
