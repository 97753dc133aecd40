use std::io::Write;

use serde_json::Value;

use crate::config::Settings;
use crate::delivery::{validate_address, Delivery};
use crate::runlog::{RunLog, EMAIL_SENT};
use crate::template::{Rendered, Templates};
use crate::transport::{DeliveryId, Payload, Transport};
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Validate addresses and attachments only
    DryRun,
    Live,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub attempted: usize,
    pub errors: usize,
}

impl Summary {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.errors
    }
}

/// Render every delivery up front. A template that does not fit the send
/// list fails here, before anything is submitted.
pub fn render_all(deliveries: &[Delivery], templates: &Templates) -> Result<Vec<Rendered>, Error> {
    deliveries.iter().map(|d| templates.render(d)).collect()
}

fn validate_addresses(payload: &Payload) -> Result<(), Error> {
    validate_address(&payload.to)?;
    for cc in &payload.cc {
        validate_address(cc)?;
    }
    Ok(())
}

/// Everything that would make a delivery fail in a dry-run, per delivery
/// index. An empty list means the batch is good to send.
pub fn preflight(
    deliveries: &[Delivery],
    settings: &Settings,
    templates: &Templates,
) -> Result<Vec<(usize, Error)>, Error> {
    let rendered = render_all(deliveries, templates)?;

    let problems = deliveries
        .iter()
        .zip(rendered.iter())
        .enumerate()
        .filter_map(|(idx, (delivery, rendered))| {
            Payload::build(delivery, settings, rendered)
                .and_then(|payload| validate_addresses(&payload))
                .err()
                .map(|e| (idx, e))
        })
        .collect();

    Ok(problems)
}

async fn deliver<T: Transport>(
    delivery: &Delivery,
    rendered: &Rendered,
    settings: &Settings,
    transport: &T,
    mode: Mode,
) -> Result<DeliveryId, Error> {
    let payload = Payload::build(delivery, settings, rendered)?;

    match mode {
        Mode::DryRun => {
            validate_addresses(&payload)?;
            Ok(DeliveryId(0))
        }
        Mode::Live => transport.submit(&payload).await,
    }
}

/// Send every delivery in order, one at a time.
///
/// Only rendering and run log failures abort. A delivery that cannot be
/// built or submitted is logged, counted, and skipped. `progress` is
/// called with the running summary after each delivery.
pub async fn send_all<T, W, P>(
    deliveries: &[Delivery],
    settings: &Settings,
    templates: &Templates,
    transport: &T,
    mode: Mode,
    runlog: &mut RunLog<W>,
    mut progress: P,
) -> Result<Summary, Error>
where
    T: Transport,
    W: Write,
    P: FnMut(&Summary),
{
    let rendered = render_all(deliveries, templates)?;
    let total = deliveries.len();
    let mut summary = Summary::default();

    for (idx, (delivery, rendered)) in deliveries.iter().zip(rendered.iter()).enumerate() {
        summary.attempted += 1;

        let mut fields = delivery.fields();

        match deliver(delivery, rendered, settings, transport, mode).await {
            Ok(id) => {
                log::info!("[{}/{}] {} -> {}", idx + 1, total, delivery.to_addr(), id);

                fields.insert("delivery_id".to_string(), Value::from(id.0));
                fields.insert("txt".to_string(), Value::from(rendered.text.as_str()));
                fields.insert("html".to_string(), Value::from(rendered.html.as_str()));
                runlog.debug(EMAIL_SENT, Value::Object(fields))?;
            }
            Err(e) => {
                log::error!("[{}/{}] {} failed: {}", idx + 1, total, delivery.to_addr(), e);

                fields.insert("error".to_string(), Value::from(e.to_string()));
                runlog.error("Delivery failed", Value::Object(fields))?;
                summary.errors += 1;
            }
        }

        progress(&summary);
    }

    match mode {
        Mode::DryRun => log::info!("Checked all deliveries (dry-run)"),
        Mode::Live => log::info!("Sent all deliveries"),
    }
    log::info!(
        "Attempted: {}, succeeded: {}, errors: {}",
        summary.attempted,
        summary.succeeded(),
        summary.errors
    );

    runlog.info(
        "Summary",
        serde_json::json!({
            "dryrun": mode == Mode::DryRun,
            "attempted": summary.attempted,
            "errors": summary.errors,
        }),
    )?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::builder;
    use crate::delivery::tests::{invoice_row, row};
    use crate::delivery::Layout;
    use crate::transport::ClientFuture;
    use std::sync::Mutex;

    /// Records every submission; fails for addresses in `fail`
    struct Recorder {
        submitted: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
    }

    impl Recorder {
        fn new(fail: Vec<&'static str>) -> Self {
            Self {
                submitted: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn submitted(&self) -> Vec<String> {
            self.submitted.lock().unwrap().clone()
        }
    }

    impl Transport for Recorder {
        fn submit<'a>(&'a self, payload: &'a Payload) -> ClientFuture<'a, DeliveryId> {
            Box::pin(async move {
                let mut submitted = self.submitted.lock().unwrap();
                submitted.push(payload.to.clone());

                if self.fail.contains(&payload.to.as_str()) {
                    Err(Error::Internal("500 Internal Server Error".to_string()))
                } else {
                    Ok(DeliveryId(1000 + submitted.len() as u64))
                }
            })
        }
    }

    fn notice(app_id: &str, email: &str) -> Delivery {
        Delivery::from_row(
            &row(5, &[("app_id", app_id), ("email_address", email)]),
            Layout::Notice,
            &[],
        )
        .unwrap()
    }

    fn templates() -> Templates {
        Templates::from_strings("No. {{ app_id }}", "<p>No. {{ app_id }}</p>").unwrap()
    }

    fn events(runlog: RunLog<Vec<u8>>) -> Vec<Value> {
        String::from_utf8(runlog.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn sent(events: &[Value]) -> Vec<&Value> {
        events
            .iter()
            .filter(|e| e["message"] == EMAIL_SENT)
            .collect()
    }

    #[tokio::test]
    async fn test_dry_run_all_valid() {
        let settings = crate::config::tests::settings();
        let deliveries = vec![
            notice("1", "a@example.com"),
            notice("2", "b@example.com"),
            notice("3", "c@example.com"),
        ];
        let transport = Recorder::new(vec![]);
        let mut runlog = RunLog::new(Vec::new());

        let summary = send_all(
            &deliveries,
            &settings,
            &templates(),
            &transport,
            Mode::DryRun,
            &mut runlog,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(summary, Summary { attempted: 3, errors: 0 });
        assert!(transport.submitted().is_empty());

        let events = events(runlog);
        let sent = sent(&events);
        assert_eq!(sent.len(), 3);
        for event in sent {
            assert_eq!(event["delivery_id"], 0);
        }
        assert_eq!(events[0]["txt"], "No. 1");
        assert_eq!(events[0]["app_id"], "1");
    }

    #[tokio::test]
    async fn test_dry_run_reports_bad_address() {
        let settings = crate::config::tests::settings();
        let deliveries = vec![
            notice("1", "a@example.com"),
            notice("2", "not an address"),
            notice("3", "c@example.com"),
        ];
        let transport = Recorder::new(vec![]);
        let mut runlog = RunLog::new(Vec::new());

        let summary = send_all(
            &deliveries,
            &settings,
            &templates(),
            &transport,
            Mode::DryRun,
            &mut runlog,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(summary, Summary { attempted: 3, errors: 1 });
        assert_eq!(summary.succeeded(), 2);
        assert!(transport.submitted().is_empty());

        let events = events(runlog);
        assert_eq!(sent(&events).len(), 2);
        assert_eq!(events[1]["message"], "Delivery failed");
        assert_eq!(events[1]["email_address"], "not an address");
    }

    #[tokio::test]
    async fn test_live_continues_after_failure() {
        let settings = crate::config::tests::settings();
        let deliveries = vec![
            notice("1", "a@example.com"),
            notice("2", "b@example.com"),
            notice("3", "c@example.com"),
            notice("4", "d@example.com"),
        ];
        let transport = Recorder::new(vec!["b@example.com", "d@example.com"]);
        let mut runlog = RunLog::new(Vec::new());

        let summary = send_all(
            &deliveries,
            &settings,
            &templates(),
            &transport,
            Mode::Live,
            &mut runlog,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(
            transport.submitted(),
            vec!["a@example.com", "b@example.com", "c@example.com", "d@example.com"]
        );
        assert_eq!(summary, Summary { attempted: 4, errors: 2 });

        let events = events(runlog);
        let sent = sent(&events);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["delivery_id"], 1001);
        assert_eq!(sent[1]["delivery_id"], 1003);
    }

    #[tokio::test]
    async fn test_progress_after_each_delivery() {
        let settings = crate::config::tests::settings();
        let deliveries = vec![
            notice("1", "a@example.com"),
            notice("2", "b@example.com"),
            notice("3", "c@example.com"),
        ];
        let transport = Recorder::new(vec!["b@example.com"]);
        let mut runlog = RunLog::new(Vec::new());
        let mut seen = Vec::new();

        send_all(
            &deliveries,
            &settings,
            &templates(),
            &transport,
            Mode::Live,
            &mut runlog,
            |summary| seen.push(*summary),
        )
        .await
        .unwrap();

        assert_eq!(
            seen,
            vec![
                Summary { attempted: 1, errors: 0 },
                Summary { attempted: 2, errors: 1 },
                Summary { attempted: 3, errors: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_attachment_is_per_delivery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-1.4").unwrap();
        let settings = Settings::from_config(
            builder()
                .set_override("layout", "invoice")
                .unwrap()
                .set_override("attachment_dir", dir.path().to_str().unwrap())
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();
        let deliveries: Vec<Delivery> = vec![
            invoice_row(2, "a@example.com", "a.pdf"),
            invoice_row(3, "b@example.com", "b.pdf"),
        ]
        .iter()
        .map(|r| Delivery::from_row(r, Layout::Invoice, &[]).unwrap())
        .collect();
        let templates = Templates::from_strings("{{ addressee }}", "{{ addressee }}").unwrap();
        let transport = Recorder::new(vec![]);
        let mut runlog = RunLog::new(Vec::new());

        let summary = send_all(
            &deliveries,
            &settings,
            &templates,
            &transport,
            Mode::Live,
            &mut runlog,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(transport.submitted(), vec!["a@example.com"]);
        assert_eq!(summary, Summary { attempted: 2, errors: 1 });
    }

    #[tokio::test]
    async fn test_render_failure_aborts_before_sending() {
        let settings = crate::config::tests::settings();
        let deliveries = vec![notice("1", "a@example.com")];
        let templates = Templates::from_strings("{{ addressee }}", "ok").unwrap();
        let transport = Recorder::new(vec![]);
        let mut runlog = RunLog::new(Vec::new());

        let result = send_all(
            &deliveries,
            &settings,
            &templates,
            &transport,
            Mode::Live,
            &mut runlog,
            |_| {},
        )
        .await;

        assert!(matches!(result, Err(Error::Template(_))));
        assert!(transport.submitted().is_empty());
    }

    #[test]
    fn test_preflight() {
        let settings = crate::config::tests::settings();
        let deliveries = vec![
            notice("1", "a@example.com"),
            notice("2", "b@"),
            notice("3", "c@example.com"),
        ];

        let problems = preflight(&deliveries, &settings, &templates()).unwrap();

        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, 1);
        assert!(matches!(problems[0].1, Error::InvalidAddress(_)));
    }
}
