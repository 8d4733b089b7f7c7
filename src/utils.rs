// Hex dump in the grouping used by the lab's serial tools: uppercase, one space between 16-bit words
pub fn hex_words(data:&[u8]) -> String {
	let mut ans = String::with_capacity(data.len() * 5 / 2);
	for (idx, byte) in data.iter().enumerate() {
		if idx > 0 && idx % 2 == 0 { ans.push(' '); }
		ans.push_str(&format!("{:02X}", byte));
	}
	ans
}
