//! Instruction text sent alongside every image.
//!
//! The marker constants are shared with [`crate::parser`]; both sides must
//! agree byte for byte.

pub const OCR_START: &str = "---OCR START---";
pub const OCR_END: &str = "---OCR END---";
pub const SUMMARY_START: &str = "---SUMMARY START---";
pub const SUMMARY_END: &str = "---SUMMARY END---";

/// Build the fixed two-task instruction (transcribe, then summarize).
pub fn build_prompt() -> String {
    format!(
        "Analise a imagem fornecida.\n\
         TAREFA 1 (OCR): Transcreva todo o texto visível, exatamente como aparece.\n\
         TAREFA 2 (RESUMO): Crie um resumo executivo curto (máximo 5 linhas).\n\
         \n\
         FORMATO DE RESPOSTA OBRIGATÓRIO:\n\
         {OCR_START}\n\
         (texto aqui)\n\
         {OCR_END}\n\
         {SUMMARY_START}\n\
         (resumo aqui)\n\
         {SUMMARY_END}\n"
    )
}
