//! Change log commands.

use kc_admin_api::{ActionRepresentation, PageResponse, RevertRequest, RevertResponse};
use kc_model::EntityType;
use serde::Serialize;
use tabled::Tabled;

use super::ApiClient;
use crate::cli::{AuditCommand, PageArgs};
use crate::config::OutputFormat;
use crate::output::{confirm, info, output, output_single, success, warning};
use crate::{CliError, CliResult};

/// Table row for a change record.
#[derive(Debug, Tabled, Serialize)]
struct ActionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Seq")]
    sequence: i64,
    #[tabled(rename = "When")]
    created_at: String,
    #[tabled(rename = "Actor")]
    actor: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Realm")]
    realm: String,
    #[tabled(rename = "Reverted")]
    reverted: String,
}

impl From<&ActionRepresentation> for ActionRow {
    fn from(action: &ActionRepresentation) -> Self {
        Self {
            id: action.id.to_string(),
            sequence: action.sequence,
            created_at: action.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            actor: action
                .actor_email
                .clone()
                .unwrap_or_else(|| action.actor_subject_id.clone()),
            action: match action.reverts_action_id {
                Some(_) => format!("{} (revert)", action.action_type),
                None => action.action_type.to_string(),
            },
            entity: format!("{} {}", action.entity_type, action.entity_name),
            realm: action.realm_name.clone(),
            reverted: if action.reverted { "yes" } else { "no" }.to_string(),
        }
    }
}

/// Runs an audit command.
pub async fn run_audit(
    cmd: AuditCommand,
    client: &ApiClient,
    format: OutputFormat,
) -> CliResult<()> {
    let path = segments(&cmd)?;
    let path: Vec<&str> = path.iter().map(String::as_str).collect();

    match cmd {
        AuditCommand::Mine { page }
        | AuditCommand::Realm { page, .. }
        | AuditCommand::All { page }
        | AuditCommand::Entity { page, .. } => {
            let result: PageResponse<ActionRepresentation> =
                client.get(&path, &page_query(page)).await?;
            print_page(&result, format)
        }
        AuditCommand::Show { .. } => {
            let action: ActionRepresentation = client.get(&path, &[]).await?;
            if format == OutputFormat::Quiet {
                println!("{}", action.id);
                return Ok(());
            }
            output_single(&action, format)
        }
        AuditCommand::CanRevert { id } => {
            let revertable: bool = client.get(&path, &[]).await?;
            match format {
                OutputFormat::Json => {
                    output_single(&serde_json::json!({ "canRevert": revertable }), format)?;
                }
                OutputFormat::Quiet => println!("{revertable}"),
                OutputFormat::Table if revertable => success(&format!("{id} can be reverted")),
                OutputFormat::Table => warning(&format!("{id} cannot be reverted")),
            }
            Ok(())
        }
        AuditCommand::Revert { id, reason, yes } => {
            if !yes && !confirm(&format!("Revert change {id}?"))? {
                return Err(CliError::Cancelled);
            }

            let response: RevertResponse =
                client.post(&path, &RevertRequest { reason }).await?;
            print_revert(&response, format)
        }
    }
}

/// Request path for a command.
fn segments(cmd: &AuditCommand) -> CliResult<Vec<String>> {
    let base = ["admin", "audit"].map(String::from);
    let tail: Vec<String> = match cmd {
        AuditCommand::Mine { .. } => vec!["actions".into(), "me".into()],
        AuditCommand::All { .. } => vec!["actions".into()],
        AuditCommand::Realm { realm, .. } => {
            if realm.trim().is_empty() {
                return Err(CliError::InvalidArgument("realm must not be blank".into()));
            }
            vec!["realms".into(), realm.clone(), "actions".into()]
        }
        AuditCommand::Entity {
            entity_type,
            entity_id,
            ..
        } => {
            let entity_type: EntityType = entity_type
                .parse::<EntityType>()
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            vec![
                "entities".into(),
                entity_type.as_str().to_ascii_lowercase(),
                entity_id.to_string(),
                "actions".into(),
            ]
        }
        AuditCommand::Show { id } => vec!["actions".into(), id.to_string()],
        AuditCommand::CanRevert { id } => {
            vec!["actions".into(), id.to_string(), "can-revert".into()]
        }
        AuditCommand::Revert { id, .. } => {
            vec!["actions".into(), id.to_string(), "revert".into()]
        }
    };
    Ok(base.into_iter().chain(tail).collect())
}

fn page_query(page: PageArgs) -> [(&'static str, String); 2] {
    [("page", page.page.to_string()), ("size", page.size.to_string())]
}

fn print_page(page: &PageResponse<ActionRepresentation>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => output_single(page, format),
        OutputFormat::Quiet => {
            for action in &page.content {
                println!("{}", action.id);
            }
            Ok(())
        }
        OutputFormat::Table => {
            let rows: Vec<ActionRow> = page.content.iter().map(ActionRow::from).collect();
            output(&rows, format)?;
            if page.total_elements > 0 {
                info(&format!(
                    "Page {} of {} ({} total)",
                    page.page + 1,
                    page.total_pages,
                    page.total_elements
                ));
            }
            Ok(())
        }
    }
}

fn print_revert(response: &RevertResponse, format: OutputFormat) -> CliResult<()> {
    if response.degraded {
        return Err(CliError::Degraded(response.message.clone()));
    }

    match (format, response.new_action_id) {
        (OutputFormat::Json, _) => output_single(response, format),
        (OutputFormat::Quiet, Some(id)) => {
            println!("{id}");
            Ok(())
        }
        (_, Some(id)) => {
            success(&format!("{} (compensating record {id})", response.message));
            Ok(())
        }
        (_, None) => {
            success(&response.message);
            Ok(())
        }
    }
}
