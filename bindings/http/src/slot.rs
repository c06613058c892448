use crosswind_runner::prelude::UserValuesConstraint;

use crate::client::HttpClientInstrumented;

/// Slot values for scenarios that only need an HTTP client.
///
/// The client is created by the first iteration that runs on the slot and then kept, along with
/// its connection pool, for every later iteration on the same slot.
#[derive(Debug, Default)]
pub struct HttpSlot {
    client: Option<HttpClientInstrumented>,
}

impl UserValuesConstraint for HttpSlot {}

impl HttpSlot {
    pub fn client(&mut self) -> anyhow::Result<&HttpClientInstrumented> {
        let client = match self.client.take() {
            Some(client) => client,
            None => HttpClientInstrumented::new()?,
        };

        Ok(self.client.insert(client))
    }
}
