//! Two components that only share a registry: one answers "Sum" queries and announces every
//! answer through an event, the other asks questions and listens for the announcements.

use std::time::Duration;

use rendezvous::{Deferred, Promise, QueryError, Registry};
use thiserror::Error;
use tokio::task::LocalSet;

#[derive(Clone, Debug, Error)]
enum SumError {
    #[error("Invalid arguments")]
    InvalidArguments,

    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Clone, Debug)]
enum Operand {
    Number(i64),
    Text(&'static str),
}

impl Operand {
    fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => {
                println!("calculator: \"{text}\" is not a number");
                None
            }
        }
    }
}

fn install_calculator(registry: &Registry) {
    let answered = registry
        .get_event::<i64>("SumAnswered")
        .expect("SumAnswered is only ever used as an i64 event");

    registry
        .get_query::<(Operand, Operand), i64, SumError>("Sum")
        .expect("Sum is only ever used with these types")
        .on_request(move |deferred: Deferred<i64, SumError>, (a, b)| {
            match (a.as_number(), b.as_number()) {
                (Some(a), Some(b)) => {
                    let total = a.saturating_add(b);
                    answered.fire(total);
                    deferred.resolve(total);
                }
                _ => deferred.reject(SumError::InvalidArguments),
            }
        });
}

fn report(label: &'static str, promise: &Promise<i64, SumError>) {
    promise
        .and_then(move |total| println!("{label}: resolved with {total}"))
        .catch(move |reason| println!("{label}: rejected with \"{reason}\""))
        .finally(move || println!("{label}: finished"));
}

async fn ask(registry: &Registry) {
    let sum = registry
        .get_query::<(Operand, Operand), i64, SumError>("Sum")
        .expect("Sum is only ever used with these types");

    let valid = sum.request((Operand::Number(1), Operand::Number(2))).await;
    report("1 + 2", &valid);

    let invalid = sum.request((Operand::Number(1), Operand::Text("x"))).await;
    report("1 + \"x\"", &invalid);

    println!("awaited: {:?}", valid.wait().await);
    println!("awaited: {:?}", invalid.wait().await);

    let unanswered = registry
        .get_query::<(), i64, SumError>("Product")
        .expect("Product is only ever used with these types");

    println!("asking a query that nobody answers...");
    let timed_out = unanswered.request(()).await;
    report("product", &timed_out);
    println!("awaited: {:?}", timed_out.wait().await);
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build runtime");

    LocalSet::new().block_on(&runtime, async {
        let registry = Registry::builder()
            .responder_timeout(Duration::from_secs(1))
            .build();

        registry
            .get_event::<i64>("SumAnswered")
            .expect("SumAnswered is only ever used as an i64 event")
            .connect(|total| println!("announcement: someone computed {total}"));

        install_calculator(&registry);
        ask(&registry).await;

        // Let the last callbacks print.
        tokio::time::sleep(Duration::from_millis(10)).await;
    });
}
