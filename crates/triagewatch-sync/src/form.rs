use serde::Serialize;
use triagewatch_core::{OccurrenceRecord, TriageAnnotation};

const YES: &str = "Sim";
const NO: &str = "Não";

fn yes_no(flag: bool) -> &'static str {
    if flag { YES } else { NO }
}

/// Form body of `upsert.php`, serialized in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertForm {
    pub id: String,
    pub abertura: String,
    pub bloco: String,
    pub unidade: String,
    pub url: String,
    pub status: String,
    pub total_mensagens: usize,
    pub data_ultima_mensagem: String,
    pub subsindico: &'static str,
    pub sindico: &'static str,
    pub responsabilidade: &'static str,
    pub adm: &'static str,
    pub resolvido: &'static str,
}

impl UpsertForm {
    pub fn new(record: &OccurrenceRecord, annotation: &TriageAnnotation) -> Self {
        Self {
            id: record.protocol.to_string(),
            abertura: record.opened_at.clone(),
            bloco: record.block.to_string(),
            unidade: record.unit.clone(),
            url: record.detail_url.clone(),
            status: record.status.clone(),
            total_mensagens: record.message_count,
            data_ultima_mensagem: record.last_message_at.clone(),
            subsindico: yes_no(annotation.deputy_involved),
            sindico: yes_no(annotation.manager_involved),
            responsabilidade: annotation.responsible.wire_value(),
            adm: yes_no(annotation.admin_involved),
            resolvido: yes_no(annotation.resolved),
        }
    }
}
