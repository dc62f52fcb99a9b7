use std::io::{self, Write};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::service::resolver::Resolution;
use certguard_common::crypto::ocsp::OcspResponse;
use certguard_common::error::AppError;
use certguard_common::model::crl::{CertificateRevocationList, RevocationList, RevokedCertificate};

const NONE_VALUE: &str = "-";

/// Renders command results as plain text. Writes to STDOUT, unless another writer is given.
pub struct ConsoleWriter {
    writer: Box<dyn Write + Send>,
}

impl ConsoleWriter {
    /// ConsoleWriter constructor
    ///
    /// # Arguments
    ///
    /// * `writer` - A [`Write`] object used to send command output (STDOUT if not given)
    ///
    /// # Returns
    ///
    /// A newly constructed [`ConsoleWriter`] object.
    ///
    pub fn new(writer: Option<Box<dyn Write + Send>>) -> Self {
        Self {
            writer: writer.unwrap_or_else(|| Box::new(io::stdout())),
        }
    }

    /// Summary of an ingested revocation list
    pub fn write_revocation_list(&mut self, revocation_list: &RevocationList) -> Result<(), AppError> {
        let lines = [
            format!("Name:        {}", &revocation_list.name),
            format!("This Update: {}", format_datetime(&revocation_list.this_update)?),
            format!("Next Update: {}", format_optional_datetime(&revocation_list.next_update)?),
            format!("Revoked:     {}", revocation_list.revoked_count()),
            format!(
                "Source URL:  {}",
                revocation_list
                    .source_url
                    .as_ref()
                    .map(|url| url.to_string())
                    .unwrap_or(NONE_VALUE.to_string())
            ),
        ];
        self.write_lines(&lines)
    }

    /// Table of stored revocation lists
    pub fn write_crl_table(&mut self, crls: &[CertificateRevocationList]) -> Result<(), AppError> {
        if crls.is_empty() {
            return self.write_lines(&["No revocation lists stored".to_string()]);
        }

        let mut lines = vec![format!(
            "{:<6} {:<32} {:<21} {:<21} {:>8}  {}",
            "ID", "NAME", "THIS UPDATE", "NEXT UPDATE", "REVOKED", "URL"
        )];
        for crl in crls {
            lines.push(format!(
                "{:<6} {:<32} {:<21} {:<21} {:>8}  {}",
                crl.id,
                &crl.name,
                format_datetime(&crl.this_update)?,
                format_optional_datetime(&crl.next_update)?,
                crl.revoked_count,
                crl.url.as_deref().unwrap_or(NONE_VALUE)
            ));
        }
        self.write_lines(&lines)
    }

    /// Table of a revocation list's revoked certificates
    pub fn write_revoked_entries(
        &mut self,
        crl: &CertificateRevocationList,
        revoked_certs: &[RevokedCertificate],
    ) -> Result<(), AppError> {
        let mut lines = vec![
            format!("Revoked certificates of {} (id={}):", &crl.name, crl.id),
            format!("{:<40} {:<22} {}", "SERIAL", "REASON", "REVOCATION DATE"),
        ];
        for revoked_cert in revoked_certs {
            lines.push(format!(
                "{:<40} {:<22} {}",
                &revoked_cert.serial_number,
                revoked_cert.reason.as_str(),
                format_datetime(&revoked_cert.revocation_date)?
            ));
        }
        self.write_lines(&lines)
    }

    /// Outcome of a local revocation lookup
    pub fn write_resolution(&mut self, resolution: &Resolution) -> Result<(), AppError> {
        let line = match &resolution.entry {
            Some(entry) => format!(
                "Serial {} is revoked by {}: reason={}, date={}",
                &resolution.serial_number,
                resolution.revoked_by.as_deref().unwrap_or(NONE_VALUE),
                entry.reason,
                format_datetime(&entry.revocation_date)?
            ),
            None => format!(
                "Serial {} is not revoked by any stored revocation list",
                &resolution.serial_number
            ),
        };
        self.write_lines(&[line])
    }

    /// OCSP responder verdict
    pub fn write_ocsp_response(&mut self, response: &OcspResponse) -> Result<(), AppError> {
        let mut lines = vec![format!("Status:          {}", response.status)];
        if let Some(revocation_date) = &response.revocation_date {
            lines.push(format!("Revocation Date: {}", format_datetime(revocation_date)?));
        }
        if let Some(revocation_reason) = &response.revocation_reason {
            lines.push(format!("Reason:          {}", revocation_reason));
        }
        lines.push(format!("Produced At:     {}", format_datetime(&response.produced_at)?));
        lines.push(format!("This Update:     {}", format_datetime(&response.this_update)?));
        lines.push(format!(
            "Next Update:     {}",
            format_optional_datetime(&response.next_update)?
        ));
        self.write_lines(&lines)
    }

    /// Free-form message
    pub fn write_message(&mut self, msg: &str) -> Result<(), AppError> {
        self.write_lines(&[msg.to_string()])
    }

    fn write_lines(&mut self, lines: &[String]) -> Result<(), AppError> {
        for line in lines {
            writeln!(self.writer, "{}", line).map_err(|err| {
                AppError::IoWithMsg("Error writing command output".to_string(), err)
            })?;
        }
        self.writer
            .flush()
            .map_err(|err| AppError::IoWithMsg("Error flushing command output".to_string(), err))
    }
}

fn format_datetime(datetime: &OffsetDateTime) -> Result<String, AppError> {
    datetime.format(&Rfc3339).map_err(|err| {
        AppError::GenWithMsgAndErr("Error formatting timestamp".to_string(), Box::new(err))
    })
}

fn format_optional_datetime(datetime: &Option<OffsetDateTime>) -> Result<String, AppError> {
    match datetime {
        Some(datetime) => format_datetime(datetime),
        None => Ok(NONE_VALUE.to_string()),
    }
}

/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{create_revocation_list, gather_rcvd_channel_text, ChannelWriter};
    use certguard_common::crypto::ocsp::OcspStatus;
    use certguard_common::model::reason::RevocationReason;
    use std::sync::mpsc;
    use time::macros::datetime;
    use url::Url;

    fn create_console() -> (ConsoleWriter, mpsc::Receiver<Vec<u8>>) {
        let (channel_sender, channel_receiver) = mpsc::channel();
        (
            ConsoleWriter::new(Some(Box::new(ChannelWriter { channel_sender }))),
            channel_receiver,
        )
    }

    #[test]
    fn console_write_revocation_list() {
        let (mut console, output) = create_console();
        let mut revocation_list =
            create_revocation_list("CA1", &[("1", RevocationReason::Superseded)]);
        revocation_list.source_url = Some(Url::parse("http://crl.certguard.test/ca1.crl").unwrap());

        let result = console.write_revocation_list(&revocation_list);

        if let Err(err) = &result {
            panic!("Unexpected result: err={:?}", &err);
        }
        assert_eq!(
            gather_rcvd_channel_text(&output),
            "Name:        CA1\n\
             This Update: 2024-01-02T00:00:00Z\n\
             Next Update: 2024-02-01T00:00:00Z\n\
             Revoked:     1\n\
             Source URL:  http://crl.certguard.test/ca1.crl\n"
        );
    }

    #[test]
    fn console_write_crl_table_when_empty() {
        let (mut console, output) = create_console();

        console.write_crl_table(&[]).unwrap();

        assert_eq!(gather_rcvd_channel_text(&output), "No revocation lists stored\n");
    }

    #[test]
    fn console_write_crl_table() {
        let (mut console, output) = create_console();
        let mut crl = CertificateRevocationList::from(&create_revocation_list("CA1", &[]));
        crl.id = 4;
        crl.revoked_count = 12;
        crl.next_update = None;

        console.write_crl_table(&[crl]).unwrap();

        let text = gather_rcvd_channel_text(&output);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID     NAME"));
        assert!(lines[1].starts_with("4      CA1 "));
        assert!(lines[1].contains("2024-01-02T00:00:00Z"));
        assert!(lines[1].ends_with("      12  -"));
    }

    #[test]
    fn console_write_resolution_when_found_and_not_found() {
        let (mut console, output) = create_console();
        let revocation_list =
            create_revocation_list("CA1", &[("123456", RevocationReason::KeyCompromise)]);
        let found = Resolution {
            serial_number: "123456".to_string(),
            found: true,
            entry: Some(RevokedCertificate::new(1, &revocation_list.entries[0])),
            revoked_by: Some("CA1".to_string()),
        };
        let not_found = Resolution {
            serial_number: "42".to_string(),
            found: false,
            entry: None,
            revoked_by: None,
        };

        console.write_resolution(&found).unwrap();
        console.write_resolution(&not_found).unwrap();

        assert_eq!(
            gather_rcvd_channel_text(&output),
            "Serial 123456 is revoked by CA1: reason=keyCompromise, date=2024-01-01T00:00:00Z\n\
             Serial 42 is not revoked by any stored revocation list\n"
        );
    }

    #[test]
    fn console_write_ocsp_response_when_revoked() {
        let (mut console, output) = create_console();
        let response = OcspResponse {
            status: OcspStatus::Revoked,
            revocation_date: Some(datetime!(2024-01-01 0:00 UTC)),
            revocation_reason: Some(RevocationReason::CaCompromise),
            produced_at: datetime!(2024-05-01 0:00 UTC),
            this_update: datetime!(2024-05-01 0:00 UTC),
            next_update: None,
        };

        console.write_ocsp_response(&response).unwrap();

        assert_eq!(
            gather_rcvd_channel_text(&output),
            "Status:          revoked\n\
             Revocation Date: 2024-01-01T00:00:00Z\n\
             Reason:          cACompromise\n\
             Produced At:     2024-05-01T00:00:00Z\n\
             This Update:     2024-05-01T00:00:00Z\n\
             Next Update:     -\n"
        );
    }
}
