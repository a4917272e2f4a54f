use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "agora";

/// Sign-in passwords in the OS keychain, one entry per handle.
pub struct CredentialStore;

impl CredentialStore {
    /// Store the password for a handle in the OS keychain
    pub fn store(handle: &str, password: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, handle)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve the password for a handle, if one was stored
    pub fn get_password(handle: &str) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, handle)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve password from keychain"),
        }
    }

    /// Delete the stored password for a handle. Deleting a missing entry succeeds.
    pub fn delete(handle: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, handle)
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}
