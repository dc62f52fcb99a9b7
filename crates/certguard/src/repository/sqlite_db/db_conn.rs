use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use certguard_common::error::AppError;
use certguard_common::logging::debug;
use certguard_common::target;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

pub static INSTANCE: Lazy<Arc<Mutex<SqliteDbConn>>> = Lazy::new(|| {
    Arc::new(Mutex::new(SqliteDbConn {
        connections: HashMap::new(),
    }))
});

pub struct SqliteDbConn {
    connections: HashMap<String, Arc<Mutex<SqliteConnection>>>,
}

impl SqliteDbConn {
    /// Connect to SQLite DB (file is created if missing), enabling foreign keys and applying pending migrations
    ///
    /// # Arguments
    ///
    /// * `database_url` - Database file path (or `:memory:`)
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the [`SqliteConnection`] object for the connection (wrapped with Arc<Mutex<>>).
    ///
    pub fn establish_connection(
        &mut self,
        database_url: &str,
    ) -> Result<Arc<Mutex<SqliteConnection>>, AppError> {
        if let Some(connection) = self.connections.get(database_url) {
            return Ok(connection.clone());
        }

        let mut connection = SqliteConnection::establish(database_url).map_err(|err| {
            AppError::StorageWithMsgAndErr(
                format!("Error establishing sqlite connection: url={}", database_url),
                Box::new(err),
            )
        })?;
        prepare_connection(&mut connection)?;

        debug(
            &target!(),
            &format!("Established sqlite connection: url={}", database_url),
        );

        let connection = Arc::new(Mutex::new(connection));
        self.connections
            .insert(database_url.to_string(), connection.clone());

        Ok(connection)
    }
}

/// Ready a new connection for use: foreign key enforcement (needed for cascading deletes) and schema migrations
pub fn prepare_connection(connection: &mut SqliteConnection) -> Result<(), AppError> {
    diesel::sql_query("PRAGMA foreign_keys = ON")
        .execute(connection)
        .map_err(|err| {
            AppError::StorageWithMsgAndErr(
                "Error enabling sqlite foreign keys".to_string(),
                Box::new(err),
            )
        })?;

    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| {
            AppError::Storage(format!("Error running sqlite migrations: err={}", err))
        })?;

    Ok(())
}

/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::diesel_orm::db_schema::certificate_revocation_list;
    use crate::testutils::TEST_STORE_DIR_PATHPARTS;
    use certguard_common::file;
    use serial_test::serial;
    use std::path::PathBuf;

    #[test]
    #[serial]
    fn sqlitedbconn_establish_connection_when_cached() {
        let store_dir: PathBuf = TEST_STORE_DIR_PATHPARTS.iter().collect();
        file::ensure_directory(&store_dir).unwrap();
        let db_file = store_dir.join("dbconn-cached.db");
        let _ = std::fs::remove_file(&db_file);
        let db_url = db_file.to_str().unwrap().to_string();

        let mut db_conn = SqliteDbConn {
            connections: HashMap::new(),
        };

        let result = db_conn.establish_connection(&db_url);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        let connection = result.unwrap();
        assert!(db_file.exists());
        assert!(Arc::ptr_eq(
            &connection,
            &db_conn.establish_connection(&db_url).unwrap()
        ));
        assert_eq!(
            certificate_revocation_list::table
                .count()
                .get_result::<i64>(&mut *connection.lock().unwrap())
                .unwrap(),
            0
        );
    }

    #[test]
    #[serial]
    fn sqlitedbconn_establish_connection_when_invalid_path() {
        let mut db_conn = SqliteDbConn {
            connections: HashMap::new(),
        };

        if let Ok(_) = db_conn.establish_connection("/nonexistent-dir/certguard/crl.db") {
            panic!("Unexpected successful result");
        }
        assert!(db_conn.connections.is_empty());
    }

    #[test]
    #[serial]
    fn dbconn_prepare_connection_when_repeated() {
        let mut connection = SqliteConnection::establish(":memory:").unwrap();

        prepare_connection(&mut connection).unwrap();
        let result = prepare_connection(&mut connection);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
    }
}
