use async_trait::async_trait;

use super::{DeliveryMessage, DeliverySink};
use crate::error::DeliveryError;

/// Prints messages instead of posting them. Used for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl DeliverySink for StdoutSink {
    async fn deliver(&self, msg: &DeliveryMessage) -> Result<(), DeliveryError> {
        println!("{}\n", msg.render());
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }

    fn records_deliveries(&self) -> bool {
        false
    }
}
