//! Model-family prompt templating for the Hugging Face inference API
//!
//! Each model family expects its own instruction wrapper; unknown
//! models get the prompt as-is.

/// Wrap a raw prompt in the instruction format of the model family.
pub fn format_for_model(model_id: &str, prompt: &str) -> String {
    if model_id.contains("Llama-PLLuM") || model_id.contains("Mistral") {
        format!("<s>[INST] {prompt} [/INST]")
    } else if model_id.contains("PLLuM") && model_id.contains("instruct") {
        format!(
            "Poniżej znajduje się instrukcja, która opisuje zadanie. \
             Napisz odpowiedź, która odpowiednio odnosi się do instrukcji.\n\n\
             ### Instrukcja:\n{prompt}\n\n### Odpowiedź:"
        )
    } else if model_id.contains("PLLuM") && model_id.contains("chat") {
        format!("<human>: {prompt}\n<assistant>:")
    } else {
        prompt.to_string()
    }
}
