use std::collections::HashMap;
use std::ops::DerefMut;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::upsert::excluded;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::repository::crl_repo::{CrlRepository, TransactionWork};
use crate::repository::diesel_orm::db_schema::{certificate_revocation_list, revoked_certificate};
use certguard_common::error::AppError;
use certguard_common::model;
use certguard_common::model::reason::RevocationReason;

/// Certificate revocation list ORM model struct
#[derive(Debug, Identifiable, Queryable, Selectable, PartialEq)]
#[diesel(table_name = certificate_revocation_list)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CertificateRevocationList {
    /// CRL ID (unique across lists)
    pub id: i64,
    /// Issuer name (unique across lists)
    pub name: String,
    pub signature: Vec<u8>,
    /// Issue date (UTC)
    pub this_update: PrimitiveDateTime,
    /// Next issue date (UTC)
    pub next_update: Option<PrimitiveDateTime>,
    /// Source URL (absent for file imports)
    pub url: Option<String>,
    pub raw: Vec<u8>,
}

/// Insertable certificate revocation list record
#[derive(Debug, Insertable, PartialEq)]
#[diesel(table_name = certificate_revocation_list)]
pub struct NewCertificateRevocationList<'a> {
    pub name: &'a str,
    pub signature: &'a [u8],
    pub this_update: PrimitiveDateTime,
    pub next_update: Option<PrimitiveDateTime>,
    pub url: Option<&'a str>,
    pub raw: &'a [u8],
}

/// Revoked certificate ORM model struct
#[derive(Debug, Identifiable, Queryable, Selectable, PartialEq)]
#[diesel(table_name = revoked_certificate)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RevokedCertificate {
    /// Entry ID
    pub id: i64,
    /// Decimal serial number
    pub serialnumber: String,
    /// Revocation date (UTC)
    pub revocation_date: PrimitiveDateTime,
    /// Revocation reason (stable string form)
    pub reason: String,
    /// Owning CRL ID
    pub revocation_list: i64,
}

/// Insertable revoked certificate record
#[derive(Debug, Insertable, PartialEq)]
#[diesel(table_name = revoked_certificate)]
pub struct NewRevokedCertificate<'a> {
    pub serialnumber: &'a str,
    pub revocation_date: PrimitiveDateTime,
    pub reason: &'a str,
    pub revocation_list: i64,
}

fn to_utc_primitive(datetime: OffsetDateTime) -> PrimitiveDateTime {
    let datetime = datetime.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(datetime.date(), datetime.time())
}

impl<'a> From<&'a model::crl::CertificateRevocationList> for NewCertificateRevocationList<'a> {
    fn from(crl: &'a model::crl::CertificateRevocationList) -> Self {
        Self {
            name: crl.name.as_str(),
            signature: crl.signature.as_slice(),
            this_update: to_utc_primitive(crl.this_update),
            next_update: crl.next_update.map(to_utc_primitive),
            url: crl.url.as_deref(),
            raw: crl.raw.as_slice(),
        }
    }
}

impl From<CertificateRevocationList> for model::crl::CertificateRevocationList {
    fn from(crl: CertificateRevocationList) -> Self {
        Self {
            id: crl.id,
            name: crl.name,
            signature: crl.signature,
            this_update: crl.this_update.assume_utc(),
            next_update: crl.next_update.map(|next_update| next_update.assume_utc()),
            url: crl.url,
            raw: crl.raw,
            revoked_count: 0,
        }
    }
}

impl TryFrom<RevokedCertificate> for model::crl::RevokedCertificate {
    type Error = AppError;

    fn try_from(revoked_cert: RevokedCertificate) -> Result<Self, Self::Error> {
        let reason = RevocationReason::from_str(&revoked_cert.reason).map_err(|_| {
            AppError::Storage(format!(
                "Unmapped revocation reason in store: id={}, reason={}",
                revoked_cert.id, &revoked_cert.reason
            ))
        })?;

        Ok(Self {
            id: revoked_cert.id,
            serial_number: revoked_cert.serialnumber,
            revocation_date: revoked_cert.revocation_date.assume_utc(),
            reason,
            revocation_list_id: revoked_cert.revocation_list,
            revoked_by: None,
        })
    }
}

/// Failure inside a Diesel transaction: either raised by the unit of work, or by the database
enum TransactionError {
    App(AppError),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for TransactionError {
    fn from(err: diesel::result::Error) -> Self {
        TransactionError::Db(err)
    }
}

fn storage_err(msg: String) -> impl FnOnce(diesel::result::Error) -> AppError {
    move |err| AppError::StorageWithMsgAndErr(msg, Box::new(err))
}

fn count_revoked_entries(connection: &mut SqliteConnection, crl_id: i64) -> Result<i64, AppError> {
    revoked_certificate::table
        .filter(revoked_certificate::revocation_list.eq(crl_id))
        .count()
        .get_result::<i64>(connection)
        .map_err(storage_err(format!("Error counting revoked entries: crl_id={}", crl_id)))
}

fn save(
    connection: &mut SqliteConnection,
    crl: &model::crl::CertificateRevocationList,
) -> Result<i64, AppError> {
    diesel::insert_into(certificate_revocation_list::table)
        .values(NewCertificateRevocationList::from(crl))
        .on_conflict(certificate_revocation_list::name)
        .do_update()
        .set((
            certificate_revocation_list::this_update
                .eq(excluded(certificate_revocation_list::this_update)),
            certificate_revocation_list::next_update
                .eq(excluded(certificate_revocation_list::next_update)),
            certificate_revocation_list::raw.eq(excluded(certificate_revocation_list::raw)),
        ))
        .execute(connection)
        .map_err(storage_err(format!("Error saving CRL: name={}", &crl.name)))?;

    certificate_revocation_list::table
        .filter(certificate_revocation_list::name.eq(&crl.name))
        .select(certificate_revocation_list::id)
        .first::<i64>(connection)
        .map_err(storage_err(format!("Error getting saved CRL id: name={}", &crl.name)))
}

fn find(
    connection: &mut SqliteConnection,
    crl_name: &str,
) -> Result<model::crl::CertificateRevocationList, AppError> {
    match certificate_revocation_list::table
        .filter(certificate_revocation_list::name.eq(crl_name))
        .select(CertificateRevocationList::as_select())
        .first(connection)
    {
        Ok(crl) => {
            let mut crl = model::crl::CertificateRevocationList::from(crl);
            crl.revoked_count = count_revoked_entries(connection, crl.id)? as u64;
            Ok(crl)
        }
        Err(diesel::NotFound) => Err(AppError::NotFound(format!(
            "Revocation list not found: name={}",
            crl_name
        ))),
        Err(err) => Err(AppError::StorageWithMsgAndErr(
            format!("Error getting CRL: name={}", crl_name),
            Box::new(err),
        )),
    }
}

fn list(
    connection: &mut SqliteConnection,
) -> Result<Vec<model::crl::CertificateRevocationList>, AppError> {
    let crls: Vec<CertificateRevocationList> = certificate_revocation_list::table
        .order(certificate_revocation_list::id.asc())
        .select(CertificateRevocationList::as_select())
        .load(connection)
        .map_err(storage_err("Error getting all CRLs".to_string()))?;

    let revoked_counts: HashMap<i64, i64> = revoked_certificate::table
        .group_by(revoked_certificate::revocation_list)
        .select((revoked_certificate::revocation_list, count_star()))
        .load::<(i64, i64)>(connection)
        .map_err(storage_err("Error counting all revoked entries".to_string()))?
        .into_iter()
        .collect();

    Ok(crls
        .into_iter()
        .map(|crl| {
            let revoked_count = revoked_counts.get(&crl.id).copied().unwrap_or(0);
            let mut crl = model::crl::CertificateRevocationList::from(crl);
            crl.revoked_count = revoked_count as u64;
            crl
        })
        .collect())
}

fn delete(connection: &mut SqliteConnection, crl_id: i64) -> Result<(), AppError> {
    let deleted_rows = diesel::delete(certificate_revocation_list::table.find(crl_id))
        .execute(connection)
        .map_err(storage_err(format!("Error deleting CRL: id={}", crl_id)))?;

    match deleted_rows {
        0 => Err(AppError::NotFound(format!(
            "Revocation list not found: id={}",
            crl_id
        ))),
        _ => Ok(()),
    }
}

fn save_revoked_entries(
    connection: &mut SqliteConnection,
    crl_id: i64,
    entries: &[model::crl::RevocationEntry],
) -> Result<usize, AppError> {
    for entry in entries {
        diesel::insert_into(revoked_certificate::table)
            .values(NewRevokedCertificate {
                serialnumber: entry.serial_number.as_str(),
                revocation_date: to_utc_primitive(entry.revocation_date),
                reason: entry.reason.as_str(),
                revocation_list: crl_id,
            })
            .on_conflict_do_nothing()
            .execute(connection)
            .map_err(storage_err(format!(
                "Error saving revoked entry: crl_id={}, serial={}",
                crl_id, &entry.serial_number
            )))?;
    }

    Ok(count_revoked_entries(connection, crl_id)? as usize)
}

fn find_revoked_entries(
    connection: &mut SqliteConnection,
    crl_id: i64,
) -> Result<Vec<model::crl::RevokedCertificate>, AppError> {
    revoked_certificate::table
        .filter(revoked_certificate::revocation_list.eq(crl_id))
        .order((
            revoked_certificate::revocation_date.asc(),
            revoked_certificate::id.asc(),
        ))
        .select(RevokedCertificate::as_select())
        .load(connection)
        .map_err(storage_err(format!(
            "Error getting revoked entries: crl_id={}",
            crl_id
        )))?
        .into_iter()
        .map(model::crl::RevokedCertificate::try_from)
        .collect()
}

fn find_revoked_entry(
    connection: &mut SqliteConnection,
    serial_number: &str,
) -> Result<Option<model::crl::RevokedCertificate>, AppError> {
    match revoked_certificate::table
        .inner_join(certificate_revocation_list::table)
        .filter(revoked_certificate::serialnumber.eq(serial_number))
        .order(revoked_certificate::id.asc())
        .select((
            RevokedCertificate::as_select(),
            certificate_revocation_list::name,
        ))
        .first::<(RevokedCertificate, String)>(connection)
    {
        Ok((revoked_cert, crl_name)) => {
            let mut revoked_cert = model::crl::RevokedCertificate::try_from(revoked_cert)?;
            revoked_cert.revoked_by = Some(crl_name);
            Ok(Some(revoked_cert))
        }
        Err(diesel::NotFound) => Ok(None),
        Err(err) => Err(AppError::StorageWithMsgAndErr(
            format!("Error getting revoked entry: serial={}", serial_number),
            Box::new(err),
        )),
    }
}

fn transaction(
    connection: &mut SqliteConnection,
    work: &mut TransactionWork<'_>,
) -> Result<(), AppError> {
    connection
        .transaction::<(), TransactionError, _>(|connection| {
            let transaction_repo = DieselTransactionRepo {
                connection: Mutex::new(connection),
            };
            work(&transaction_repo).map_err(TransactionError::App)
        })
        .map_err(|err| match err {
            TransactionError::App(err) => err,
            TransactionError::Db(err) => AppError::StorageWithMsgAndErr(
                "Error executing CRL transaction".to_string(),
                Box::new(err),
            ),
        })
}

/// CRL Repository
pub struct DieselCrlRepo {
    /// An established Diesel connection object
    connection: Arc<Mutex<SqliteConnection>>,
}

impl DieselCrlRepo {
    /// Creates a new CRL repository.
    ///
    /// # Arguments
    ///
    /// * `db_conn` - Established (and migrated) SQLite connection
    ///
    /// # Returns
    ///
    /// A newly constructed [`DieselCrlRepo`] object.
    ///
    pub fn new(db_conn: &Arc<Mutex<SqliteConnection>>) -> DieselCrlRepo {
        DieselCrlRepo {
            connection: db_conn.clone(),
        }
    }

    fn access_connection(&self) -> Result<MutexGuard<SqliteConnection>, AppError> {
        self.connection.lock().map_err(|err| {
            AppError::Storage(format!("Failed to access DB connection: err={}", err))
        })
    }
}

impl CrlRepository for DieselCrlRepo {
    fn connect_to_datasource(&mut self, _connect_spec: &str) -> Result<(), AppError> {
        Ok(())
    }

    fn save(&self, crl: &model::crl::CertificateRevocationList) -> Result<i64, AppError> {
        save(self.access_connection()?.deref_mut(), crl)
    }

    fn find(&self, name: &str) -> Result<model::crl::CertificateRevocationList, AppError> {
        find(self.access_connection()?.deref_mut(), name)
    }

    fn list(&self) -> Result<Vec<model::crl::CertificateRevocationList>, AppError> {
        list(self.access_connection()?.deref_mut())
    }

    fn delete(&self, crl_id: i64) -> Result<(), AppError> {
        delete(self.access_connection()?.deref_mut(), crl_id)
    }

    fn save_revoked_entries(
        &self,
        crl_id: i64,
        entries: &[model::crl::RevocationEntry],
    ) -> Result<usize, AppError> {
        save_revoked_entries(self.access_connection()?.deref_mut(), crl_id, entries)
    }

    fn find_revoked_entries(
        &self,
        crl_id: i64,
    ) -> Result<Vec<model::crl::RevokedCertificate>, AppError> {
        find_revoked_entries(self.access_connection()?.deref_mut(), crl_id)
    }

    fn find_revoked_entry(
        &self,
        serial_number: &str,
    ) -> Result<Option<model::crl::RevokedCertificate>, AppError> {
        find_revoked_entry(self.access_connection()?.deref_mut(), serial_number)
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), AppError> {
        transaction(self.access_connection()?.deref_mut(), work)
    }
}

/// CRL repository bound to an open transaction's connection
struct DieselTransactionRepo<'a> {
    connection: Mutex<&'a mut SqliteConnection>,
}

impl<'a> DieselTransactionRepo<'a> {
    fn access_connection(&self) -> Result<MutexGuard<'_, &'a mut SqliteConnection>, AppError> {
        self.connection.lock().map_err(|err| {
            AppError::Storage(format!("Failed to access transaction connection: err={}", err))
        })
    }
}

impl CrlRepository for DieselTransactionRepo<'_> {
    fn connect_to_datasource(&mut self, _connect_spec: &str) -> Result<(), AppError> {
        Err(AppError::Storage(
            "Cannot connect to datasource within a transaction".to_string(),
        ))
    }

    fn save(&self, crl: &model::crl::CertificateRevocationList) -> Result<i64, AppError> {
        save(&mut **self.access_connection()?, crl)
    }

    fn find(&self, name: &str) -> Result<model::crl::CertificateRevocationList, AppError> {
        find(&mut **self.access_connection()?, name)
    }

    fn list(&self) -> Result<Vec<model::crl::CertificateRevocationList>, AppError> {
        list(&mut **self.access_connection()?)
    }

    fn delete(&self, crl_id: i64) -> Result<(), AppError> {
        delete(&mut **self.access_connection()?, crl_id)
    }

    fn save_revoked_entries(
        &self,
        crl_id: i64,
        entries: &[model::crl::RevocationEntry],
    ) -> Result<usize, AppError> {
        save_revoked_entries(&mut **self.access_connection()?, crl_id, entries)
    }

    fn find_revoked_entries(
        &self,
        crl_id: i64,
    ) -> Result<Vec<model::crl::RevokedCertificate>, AppError> {
        find_revoked_entries(&mut **self.access_connection()?, crl_id)
    }

    fn find_revoked_entry(
        &self,
        serial_number: &str,
    ) -> Result<Option<model::crl::RevokedCertificate>, AppError> {
        find_revoked_entry(&mut **self.access_connection()?, serial_number)
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), AppError> {
        transaction(&mut **self.access_connection()?, work)
    }
}
