pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_documents.sql")),
				"tables/002_embedding_chunks.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_embedding_chunks.sql")),
				"tables/003_indicator_definitions.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_indicator_definitions.sql")),
				"tables/004_extracted_indicators.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_extracted_indicators.sql")),
				"tables/005_scores.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_scores.sql")),
				"tables/006_task_queue.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_task_queue.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
