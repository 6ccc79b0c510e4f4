/// The host portal's DOM contract.
///
/// None of this is ours: element ids come from ASP.NET WebForms naming,
/// message lines are recognised by an inline-style signature, and the frame
/// names are fixed by the portal's layout. Everything that reads the host page
/// goes through these names so a portal change is a one-file fix.
pub mod portal {
    use std::sync::LazyLock;

    use crate::dom::Selector;

    // ── Element ids ──

    pub const PROTOCOL_LABEL: &str = "ctl00_conteudo_lblProtocolo";
    pub const OPENED_AT_LABEL: &str = "ctl00_conteudo_lblEm";
    pub const STATUS_SELECT: &str = "ctl00_conteudo_ddlStatus";

    /// Frame holding the paginated occurrence listing.
    pub const LISTING_FRAME: &str = "IFC";
    /// Frame holding the selected occurrence's detail view.
    pub const DETAIL_FRAME: &str = "IFRAME_DETALHE";

    // ── URL shapes ──

    pub const DETAIL_PATH_MARKER: &str = "mensagem_detalhe.aspx";
    pub const LISTING_PATH_MARKER: &str = "mensagensV1.aspx";

    // ── Selectors ──

    const PROFILE_BLOCK_SRC: &str = ".perfil_ocorrencia";
    const PROFILE_LINE_SRC: &str = "div.esq.t100.s11.truncate:nth-child(2)";
    const MESSAGE_DATE_SRC: &str = ".perfil_ocorrencia > div.esq.t100.s11.truncate:nth-child(3)";
    const THREAD_SRC: &str = ".coment-grid";
    const MESSAGE_LINE_SRC: &str = r#".linha[style*="padding: 0 0 12% 0"]"#;
    const LISTING_ENTRY_SRC: &str = r#"a[id*="lvLista_ctrl"][id$="_lnkEdit"]"#;
    const ENTRY_INFO_SRC: &str = ".esq.t80";
    const ENTRY_INDICATOR_SRC: &str = ".color_button";

    fn compile(src: &str) -> Selector {
        Selector::parse(src).unwrap_or_else(|e| panic!("portal selector {src:?}: {e}"))
    }

    /// Header block with author, "Bloco X - NNNN" and date lines.
    pub static PROFILE_BLOCK: LazyLock<Selector> = LazyLock::new(|| compile(PROFILE_BLOCK_SRC));
    /// The "Bloco X - NNNN" line inside a profile block.
    pub static PROFILE_LINE: LazyLock<Selector> = LazyLock::new(|| compile(PROFILE_LINE_SRC));
    /// The date line inside a message's profile block.
    pub static MESSAGE_DATE: LazyLock<Selector> = LazyLock::new(|| compile(MESSAGE_DATE_SRC));
    /// Conversation thread container.
    pub static THREAD: LazyLock<Selector> = LazyLock::new(|| compile(THREAD_SRC));
    /// One message in the thread, recognised by its inline padding.
    pub static MESSAGE_LINE: LazyLock<Selector> = LazyLock::new(|| compile(MESSAGE_LINE_SRC));
    /// Row anchor in the listing frame.
    pub static LISTING_ENTRY: LazyLock<Selector> = LazyLock::new(|| compile(LISTING_ENTRY_SRC));
    /// Cell with "NNNN | subject" text inside a row anchor.
    pub static ENTRY_INFO: LazyLock<Selector> = LazyLock::new(|| compile(ENTRY_INFO_SRC));
    /// Element recolored to show triage status.
    pub static ENTRY_INDICATOR: LazyLock<Selector> =
        LazyLock::new(|| compile(ENTRY_INDICATOR_SRC));

    #[cfg(test)]
    pub(crate) const ALL_SOURCES: &[&str] = &[
        PROFILE_BLOCK_SRC,
        PROFILE_LINE_SRC,
        MESSAGE_DATE_SRC,
        THREAD_SRC,
        MESSAGE_LINE_SRC,
        LISTING_ENTRY_SRC,
        ENTRY_INFO_SRC,
        ENTRY_INDICATOR_SRC,
    ];
}

#[cfg(test)]
mod tests {
    use super::portal;
    use crate::dom::Selector;

    #[test]
    fn portal_selectors_parse() {
        for src in portal::ALL_SOURCES {
            let sel = Selector::parse(src).unwrap();
            assert_eq!(sel.as_str(), *src);
        }
    }
}
