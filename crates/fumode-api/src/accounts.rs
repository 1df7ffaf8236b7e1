//! In-memory customer and admin accounts

use crate::auth::{ADMIN_ROLE, CUSTOMER_ROLE};
use argon2::password_hash::{PasswordHash as Phc, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

impl From<argon2::password_hash::Error> for PasswordError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self(err.to_string())
    }
}

/// Argon2id password hash in PHC string form, salt included.
///
/// Hashing and verification are CPU-bound; run them on the blocking pool.
#[derive(Clone)]
pub struct PasswordHash {
    phc: String,
}

impl PasswordHash {
    pub fn new(plaintext: &str) -> Result<Self, PasswordError> {
        let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())?;
        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)?
            .to_string();
        Ok(Self { phc })
    }

    pub fn matches(&self, plaintext: &str) -> bool {
        match Phc::new(&self.phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    pub fn as_phc(&self) -> &str {
        &self.phc
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}

/// What login needs to know about an account
pub trait Account: Clone {
    fn id(&self) -> u64;
    fn role(&self) -> &str;
    fn password(&self) -> &PasswordHash;
}

/// A registered customer
#[derive(Clone, Debug, Serialize)]
pub struct Customer {
    pub customer_id: u64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: PasswordHash,
    #[serde(skip)]
    pub role: String,
    pub address: String,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

impl Account for Customer {
    fn id(&self) -> u64 {
        self.customer_id
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn password(&self) -> &PasswordHash {
        &self.password
    }
}

/// A store administrator
#[derive(Clone, Debug, Serialize)]
pub struct Admin {
    pub admin_id: u64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: PasswordHash,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl Account for Admin {
    fn id(&self) -> u64 {
        self.admin_id
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn password(&self) -> &PasswordHash {
        &self.password
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("a user with this email already exists")]
    DuplicateEmail,
}

/// Accounts keyed by lowercased email
pub struct Directory<A> {
    by_email: DashMap<String, A>,
    next_id: AtomicU64,
}

pub type CustomerDirectory = Directory<Customer>;
pub type AdminDirectory = Directory<Admin>;

impl<A> Default for Directory<A> {
    fn default() -> Self {
        Self {
            by_email: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<A: Account> Directory<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the account built from the next id. Fails if the email is taken.
    fn insert_with(&self, email: &str, build: impl FnOnce(u64) -> A) -> Result<A, DirectoryError> {
        match self.by_email.entry(email.to_lowercase()) {
            Entry::Occupied(_) => Err(DirectoryError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let account = build(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    pub fn get_by_email(&self, email: &str) -> Option<A> {
        self.by_email
            .get(&email.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }
}

impl Directory<Customer> {
    /// Register a customer
    pub fn insert(&self, name: &str, email: &str, password: PasswordHash) -> Result<Customer, DirectoryError> {
        self.insert_with(email, |customer_id| Customer {
            customer_id,
            name: name.to_string(),
            email: email.to_string(),
            password,
            role: CUSTOMER_ROLE.to_string(),
            address: String::new(),
            phone_number: String::new(),
            created_at: Utc::now(),
        })
    }
}

impl Directory<Admin> {
    /// Register an admin
    pub fn insert(&self, name: &str, email: &str, password: PasswordHash) -> Result<Admin, DirectoryError> {
        self.insert_with(email, |admin_id| Admin {
            admin_id,
            name: name.to_string(),
            email: email.to_string(),
            password,
            role: ADMIN_ROLE.to_string(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static HASH: LazyLock<PasswordHash> = LazyLock::new(|| PasswordHash::new("pa55word!").unwrap());

    #[test]
    fn test_password_hash() {
        assert!(HASH.matches("pa55word!"));
        assert!(!HASH.matches("pa55word"));
        assert!(!HASH.matches(""));
    }

    #[test]
    fn test_password_hash_is_salted_phc_string() {
        let phc = HASH.as_phc();
        assert!(phc.starts_with("$argon2id$"), "{phc}");
        assert!(!phc.contains("pa55word!"));
        assert_ne!(phc.len(), 32);
        assert_ne!(phc.len(), 64);

        // Same plaintext, different salt
        let other = PasswordHash::new("pa55word!").unwrap();
        assert_ne!(phc, other.as_phc());
        assert!(other.matches("pa55word!"));
        assert_eq!(format!("{other:?}"), "PasswordHash(..)");
    }

    #[test]
    fn test_duplicate_email_is_case_insensitive() {
        let directory = CustomerDirectory::new();
        let first = directory.insert("Ada", "ada@example.com", HASH.clone()).unwrap();
        assert_eq!(first.customer_id, 1);

        let err = directory
            .insert("Ada again", "ADA@example.com", HASH.clone())
            .unwrap_err();
        assert_eq!(err, DirectoryError::DuplicateEmail);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_admins_and_customers_are_separate() {
        let customers = CustomerDirectory::new();
        let admins = AdminDirectory::new();
        customers.insert("Ada", "ada@example.com", HASH.clone()).unwrap();
        let admin = admins.insert("Ada", "ada@example.com", HASH.clone()).unwrap();

        assert_eq!(admin.admin_id, 1);
        assert_eq!(admin.role(), ADMIN_ROLE);
        assert_eq!(customers.get_by_email("ada@example.com").unwrap().role(), CUSTOMER_ROLE);
        assert!(admins.get_by_email("bob@example.com").is_none());
    }

    #[test]
    fn test_serialized_accounts_hide_password() {
        let customers = CustomerDirectory::new();
        let customer = customers.insert("Ada", "ada@example.com", HASH.clone()).unwrap();
        let json = serde_json::to_value(&customer).unwrap();
        assert_eq!(json["email"], "ada@example.com");
        assert!(json.get("password").is_none());
        assert!(json.get("role").is_none());

        let admins = AdminDirectory::new();
        let admin = admins.insert("Root", "root@example.com", HASH.clone()).unwrap();
        let json = serde_json::to_value(&admin).unwrap();
        assert_eq!(json["role"], ADMIN_ROLE);
        assert!(json.get("password").is_none());
    }

    #[test]
    fn test_concurrent_registration_of_one_email() {
        let directory = CustomerDirectory::new();
        let created: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| directory.insert("Ada", "ada@example.com", HASH.clone()).is_ok()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });
        assert_eq!(created, 1);
    }
}
