use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::client::Store;
use crate::seed::{
    sample_order, SeedConfig, DEMO_CUSTOMER_ID, LOOKUP_CUSTOMER_ID, TIRES_CATEGORY_ID,
    TIRES_CATEGORY_RENAMED,
};
use crate::session::Session;

const PROMPT: &str = "Sales order desk
-----------------------------------------
[a]   Query for single customer
[b]   Point read for single customer
[c]   List all product categories
[d]   Query products by category id
[e]   Update product category name
[f]   Query orders by customer id
[g]   Query for customer and all orders
[h]   Create new order and update order total
[i]   Delete order and update order total
[j]   Query top 10 customers
-----------------------------------------
[l]   Load sample data
-----------------------------------------
[x]   Exit

> ";

/// Interactive loop over `input`/`output`. A failed action is reported and the
/// loop carries on; `x` or end of input ends it with the session statistics.
pub struct Menu<'a, S, R, W> {
    session: &'a Session<S>,
    input: R,
    output: W,
    last_order: Option<(String, String)>,
}

impl<'a, S, R, W> Menu<'a, S, R, W>
where
    S: Store,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(session: &'a Session<S>, input: R, output: W) -> Self {
        Self {
            session,
            input,
            output,
            last_order: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            self.write(&format!("\n{PROMPT}")).await?;
            let Some(selection) = self.read_line().await? else {
                break;
            };
            self.write(&format!("\nYour selection is: {selection}\n\n"))
                .await?;

            if selection == "x" {
                self.write("exiting...\n").await?;
                break;
            }
            match self.dispatch(&selection).await {
                Ok(text) => self.write(&format!("{text}\n")).await?,
                Err(err) => {
                    warn!(selection = %selection, error = %err, "Menu action failed");
                    self.write(&format!("Error: {err:#}\n")).await?;
                }
            }
        }

        let metrics = self.session.metrics().await;
        self.write(&format!("{metrics}\n")).await?;
        Ok(())
    }

    async fn dispatch(&mut self, selection: &str) -> Result<String> {
        match selection {
            "a" => {
                let customer_id = self.ask("Customer id", LOOKUP_CUSTOMER_ID).await?;
                self.session.query_customer(&customer_id).await
            }
            "b" => {
                let customer_id = self.ask("Customer id", LOOKUP_CUSTOMER_ID).await?;
                self.session.customer(&customer_id).await
            }
            "c" => self.session.categories().await,
            "d" => {
                let category_id = self.ask("Category id", TIRES_CATEGORY_ID).await?;
                self.session.products(&category_id).await
            }
            "e" => self.rename_and_revert().await,
            "f" => {
                let customer_id = self.ask("Customer id", DEMO_CUSTOMER_ID).await?;
                self.session.orders(&customer_id).await
            }
            "g" => {
                let customer_id = self.ask("Customer id", DEMO_CUSTOMER_ID).await?;
                self.session.customer_with_orders(&customer_id).await
            }
            "h" => {
                let customer_id = self.ask("Customer id", DEMO_CUSTOMER_ID).await?;
                let order = sample_order(&customer_id);
                let outcome = self.session.record_order(&customer_id, &order).await?;
                self.last_order = Some((customer_id, order.id));
                Ok(outcome.to_string())
            }
            "i" => {
                let (default_customer, default_order) = self
                    .last_order
                    .clone()
                    .unwrap_or_else(|| (DEMO_CUSTOMER_ID.to_string(), String::new()));
                let customer_id = self.ask("Customer id", &default_customer).await?;
                let order_id = self.ask("Order id", &default_order).await?;
                let outcome = self.session.delete_order(&customer_id, &order_id).await?;
                if self.last_order.as_ref().map(|(_, id)| id) == Some(&order_id) {
                    self.last_order = None;
                }
                Ok(outcome.to_string())
            }
            "j" => self.session.top_customers(10).await,
            "l" => self.session.seed(&SeedConfig::default()).await,
            other => Ok(format!("Unknown selection [{other}]")),
        }
    }

    /// Rename a category, showing the product counts per carried name before,
    /// after, and once the old name is restored.
    async fn rename_and_revert(&mut self) -> Result<String> {
        let category_id = self.ask("Category id", TIRES_CATEGORY_ID).await?;
        let name = self.ask("New name", TIRES_CATEGORY_RENAMED).await?;

        let before = self.session.category_counts(&category_id).await?;
        let renamed = self.session.rename_category(&category_id, &name).await?;
        let after = self.session.category_counts(&category_id).await?;
        let reverted = self
            .session
            .rename_category(&category_id, &renamed.previous_name)
            .await?;
        let restored = self.session.category_counts(&category_id).await?;

        Ok([before, renamed.to_string(), after, reverted.to_string(), restored].join("\n"))
    }

    /// Prompt for a value; an empty answer takes `default`.
    async fn ask(&mut self, label: &str, default: &str) -> Result<String> {
        if default.is_empty() {
            self.write(&format!("{label}: ")).await?;
        } else {
            self.write(&format!("{label} [{default}]: ")).await?;
        }
        let answer = self.read_line().await?.unwrap_or_default();
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CountPolicy;
    use crate::database::Containers;
    use crate::memory::MemoryStore;
    use crate::seed::TIRES_CATEGORY_NAME;

    async fn run_script(session: &Session<MemoryStore>, script: &str) -> String {
        let mut output = Vec::new();
        Menu::new(session, script.as_bytes(), &mut output)
            .run()
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn errors_do_not_end_the_session() {
        let session = Session::new(Containers::in_memory(), CountPolicy::Increment);
        let output = run_script(&session, "b\nnobody\nq\nx\n").await;

        assert!(output.contains("Error:"));
        assert!(output.contains("Unknown selection [q]"));
        assert!(output.contains("exiting..."));
        assert!(output.contains("Session Request Statistics"));
    }

    #[tokio::test]
    async fn records_and_deletes_an_order_with_defaults() {
        let session = Session::new(Containers::in_memory(), CountPolicy::Increment);
        let output = run_script(&session, "l\nh\n\ni\n\n\n").await;

        assert!(output.contains("Created"));
        assert!(output.contains(&format!(
            "Customer {DEMO_CUSTOMER_ID} now has salesOrderCount 3"
        )));
        assert!(output.contains(&format!(
            "Customer {DEMO_CUSTOMER_ID} now has salesOrderCount 2"
        )));
        // end of input behaves like exit
        assert!(output.contains("Total request charge"));
    }

    #[tokio::test]
    async fn renames_a_category_and_restores_it() {
        let session = Session::new(Containers::in_memory(), CountPolicy::Increment);
        let output = run_script(&session, "l\nc\nd\n\ne\n\n\nx\n").await;

        assert!(output.contains("\"value\": \"Accessories, Helmets\""));
        assert!(output.contains("\"sku\": \"TT-T092\""));
        assert!(output.contains(&format!("{TIRES_CATEGORY_RENAMED}: 5 products")));
        assert!(output.contains(&format!(
            "renamed from [{TIRES_CATEGORY_RENAMED}] to [{TIRES_CATEGORY_NAME}]"
        )));
        assert!(session
            .categories()
            .await
            .unwrap()
            .contains(TIRES_CATEGORY_NAME));
    }
}
