//! Typed databases.

use crate::accessor::Txn;
use crate::config::DbOptions;
use crate::env::EnvShared;
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use txmdb_codec::{BufferCache, Serializer};
use txmdb_storage::{DbFlags, Dbi};

/// A database whose keys and values go through serializers.
///
/// Every operation takes the [`Txn`] scope it runs in. Scopes from other
/// environments are rejected.
pub struct Database<K, V> {
    env: Arc<EnvShared>,
    dbi: Dbi,
    keys: K,
    values: V,
    key_buffers: BufferCache,
    value_buffers: BufferCache,
}

impl<K, V> Database<K, V>
where
    K: Serializer,
    V: Serializer,
{
    pub(crate) fn new(env: Arc<EnvShared>, dbi: Dbi, keys: K, values: V) -> Self {
        let key_buffers = BufferCache::for_serializer(&keys);
        let value_buffers = BufferCache::for_serializer(&values);
        Self {
            env,
            dbi,
            keys,
            values,
            key_buffers,
            value_buffers,
        }
    }

    /// Native flags implied by the serializers and options.
    pub(crate) fn native_flags(keys: &K, values: &V, options: DbOptions, create: bool) -> DbFlags {
        let mut flags = DbFlags::EMPTY;
        if create {
            flags = flags | DbFlags::CREATE;
        }
        if keys.integer_keys() {
            flags = flags | DbFlags::INTEGER_KEY;
        }
        if options.dup_sort {
            flags = flags | DbFlags::DUP_SORT;
            if values.fixed_size() {
                flags = flags | DbFlags::DUP_FIXED;
            }
            if values.integer_keys() {
                flags = flags | DbFlags::INTEGER_DUP;
            }
        }
        flags
    }

    fn check_scope(&self, txn: &Txn) -> CoreResult<()> {
        self.env.assert_open()?;
        if !Arc::ptr_eq(&self.env, txn.env()) {
            return Err(CoreError::illegal_state(
                "the transaction belongs to another environment",
            ));
        }
        Ok(())
    }

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope is not usable here or a value cannot be
    /// decoded.
    pub fn get(&self, txn: &Txn, key: &K::Value) -> CoreResult<Option<V::Value>> {
        self.check_scope(txn)?;
        let key = self.keys.serialize(key, self.key_buffers.acquire())?;
        let result = txn.with_native(|native| match native.get(self.dbi, &key)? {
            Some(bytes) => Ok(Some(self.values.deserialize(bytes)?)),
            None => Ok(None),
        });
        self.key_buffers.release(key);
        result
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if the scope's transaction is read-only, or a
    /// storage error such as a full map.
    pub fn put(&self, txn: &Txn, key: &K::Value, value: &V::Value) -> CoreResult<()> {
        self.check_scope(txn)?;
        let key = self.keys.serialize(key, self.key_buffers.acquire())?;
        let value = self.values.serialize(value, self.value_buffers.acquire())?;
        let result = txn.with_native(|native| {
            if native.is_read_only() {
                return Err(CoreError::unsupported("put in a read-only transaction"));
            }
            native.put(self.dbi, &key, &value)?;
            Ok(())
        });
        self.key_buffers.release(key);
        self.value_buffers.release(value);
        result
    }

    /// Deletes `key` and all its values. Returns false if it was absent.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` if the scope's transaction is read-only.
    pub fn delete(&self, txn: &Txn, key: &K::Value) -> CoreResult<bool> {
        self.check_scope(txn)?;
        let key = self.keys.serialize(key, self.key_buffers.acquire())?;
        let result = txn.with_native(|native| {
            if native.is_read_only() {
                return Err(CoreError::unsupported("delete in a read-only transaction"));
            }
            Ok(native.del(self.dbi, &key)?)
        });
        self.key_buffers.release(key);
        result
    }

    /// Number of entries visible to the scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope is not usable here.
    pub fn entries(&self, txn: &Txn) -> CoreResult<u64> {
        self.check_scope(txn)?;
        txn.with_native(|native| Ok(native.db_stat(self.dbi)?.entries))
    }
}

impl<K, V> std::fmt::Debug for Database<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dbi", &self.dbi)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnvConfig, Environment};
    use serde::{Deserialize, Serialize};
    use txmdb_codec::{ObjectSerializer, BYTE_ARRAY, INT, LONG, STRING, UNSIGNED_INT};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        owner: String,
        balance: i64,
    }

    fn env_with_dbs() -> Environment {
        Environment::open_temporary_with_config(EnvConfig::new().max_dbs(8)).unwrap()
    }

    #[test]
    fn flags_follow_serializers() {
        let flags = Database::native_flags(&INT, &STRING, DbOptions::default(), true);
        assert!(flags.contains(DbFlags::CREATE | DbFlags::INTEGER_KEY));
        assert!(!flags.contains(DbFlags::DUP_SORT));

        let flags = Database::native_flags(&STRING, &LONG, DbOptions::new().dup_sort(true), false);
        assert!(!flags.contains(DbFlags::CREATE));
        assert!(!flags.contains(DbFlags::INTEGER_KEY));
        assert!(flags.contains(DbFlags::DUP_SORT | DbFlags::DUP_FIXED | DbFlags::INTEGER_DUP));

        let flags = Database::native_flags(&STRING, &BYTE_ARRAY, DbOptions::new().dup_sort(true), true);
        assert!(flags.contains(DbFlags::DUP_SORT));
        assert!(!flags.contains(DbFlags::DUP_FIXED));
    }

    #[test]
    fn string_database_crud() {
        let env = env_with_dbs();
        let db = env
            .open_database(Some("names"), STRING, STRING, DbOptions::default())
            .unwrap();

        let txn = env.with_read_write_txn().unwrap();
        db.put(&txn, &"a".to_string(), &"alpha".to_string()).unwrap();
        db.put(&txn, &"b".to_string(), &"beta".to_string()).unwrap();
        assert!(db.delete(&txn, &"b".to_string()).unwrap());
        assert!(!db.delete(&txn, &"b".to_string()).unwrap());
        txn.commit().unwrap();

        let txn = env.with_read_only_txn().unwrap();
        assert_eq!(
            db.get(&txn, &"a".to_string()).unwrap(),
            Some("alpha".to_string())
        );
        assert_eq!(db.get(&txn, &"b".to_string()).unwrap(), None);
        assert_eq!(db.entries(&txn).unwrap(), 1);
    }

    #[test]
    fn integer_keys_roundtrip() {
        let env = env_with_dbs();
        let db = env
            .open_database(Some("ints"), INT, LONG, DbOptions::default())
            .unwrap();

        let txn = env.with_read_write_txn().unwrap();
        for k in [i32::MIN, -1, 0, 1, i32::MAX] {
            db.put(&txn, &k, &(i64::from(k) * 2)).unwrap();
        }
        txn.commit().unwrap();

        let txn = env.with_read_only_txn().unwrap();
        assert_eq!(db.entries(&txn).unwrap(), 5);
        assert_eq!(db.get(&txn, &i32::MIN).unwrap(), Some(i64::from(i32::MIN) * 2));
        assert_eq!(db.get(&txn, &7).unwrap(), None);
    }

    #[test]
    fn unsigned_and_object_values() {
        let env = env_with_dbs();
        let db = env
            .open_database(
                Some("accounts"),
                UNSIGNED_INT,
                ObjectSerializer::<Account>::new(),
                DbOptions::default(),
            )
            .unwrap();
        let account = Account {
            owner: "ada".into(),
            balance: -40,
        };

        let txn = env.with_read_write_txn().unwrap();
        db.put(&txn, &-1, &account).unwrap();
        txn.commit().unwrap();

        let txn = env.with_read_only_txn().unwrap();
        assert_eq!(db.get(&txn, &-1).unwrap(), Some(account));
    }

    #[test]
    fn write_through_read_only_scope_is_unsupported() {
        let env = env_with_dbs();
        let db = env
            .open_database(None, STRING, BYTE_ARRAY, DbOptions::default())
            .unwrap();

        let txn = env.with_read_only_txn().unwrap();
        assert!(matches!(
            db.put(&txn, &"k".to_string(), &vec![1]),
            Err(CoreError::Unsupported { .. })
        ));
        assert!(matches!(
            db.delete(&txn, &"k".to_string()),
            Err(CoreError::Unsupported { .. })
        ));
    }

    #[test]
    fn scope_from_other_environment_is_rejected() {
        let env = env_with_dbs();
        let other = env_with_dbs();
        let db = env
            .open_database(None, STRING, STRING, DbOptions::default())
            .unwrap();

        let txn = other.with_read_only_txn().unwrap();
        assert!(matches!(
            db.get(&txn, &"k".to_string()),
            Err(CoreError::IllegalState { .. })
        ));
    }

    #[test]
    fn missing_database_without_create() {
        let env = env_with_dbs();
        let result = env.open_database(
            Some("absent"),
            STRING,
            STRING,
            DbOptions::new().create(false),
        );
        assert!(matches!(result, Err(CoreError::Storage(_))));
        assert_eq!(env.txn_state().unwrap(), crate::TxnState::Idle);
    }

    #[test]
    fn closed_environment_rejects_operations() {
        let env = env_with_dbs();
        let db = env
            .open_database(None, STRING, STRING, DbOptions::default())
            .unwrap();
        let txn = env.with_read_only_txn().unwrap();
        env.close();
        assert!(matches!(
            db.get(&txn, &"k".to_string()),
            Err(CoreError::EnvironmentClosed)
        ));
    }
}
