//! # routes::dashboard
//!
//! `GET /` — a single static page that polls `/api/status`. The API key, if
//! any, is kept in the browser's localStorage and sent as `X-API-Key`.

use axum::response::Html;

const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Martingrid</title>
<style>
  body { font-family: monospace; background: #111; color: #ddd; margin: 2em; }
  table { border-collapse: collapse; }
  td { padding: 2px 12px; border-bottom: 1px solid #333; }
  .err { color: #f66; }
</style>
</head>
<body>
<h2>Martingrid</h2>
<p>API key <input id="key" type="password" size="24"> <span id="msg"></span></p>
<table id="status"></table>
<h3>Trades</h3>
<table id="trades"></table>
<script>
const keyInput = document.getElementById('key');
keyInput.value = localStorage.getItem('martingrid.key') || '';
keyInput.onchange = () => localStorage.setItem('martingrid.key', keyInput.value);

const FIELDS = ['status', 'price', 'position_size', 'average_price', 'net_pnl',
  'entry_count', 'last_grid_price', 'next_trigger_price', 'peak_price',
  'funding_rate', 'enabled', 'cycle_count', 'updated_at'];

function rows(pairs) {
  return pairs.map(([k, v]) => `<tr><td>${k}</td><td>${v ?? '-'}</td></tr>`).join('');
}

async function refresh() {
  const msg = document.getElementById('msg');
  try {
    const res = await fetch('/api/status', { headers: { 'X-API-Key': keyInput.value } });
    const body = await res.json();
    if (!body.ok) throw new Error(body.error);
    const s = body.status;
    document.getElementById('status').innerHTML = rows(FIELDS.map(f => [f, s[f]]));
    document.getElementById('trades').innerHTML = rows(
      s.trade_log.slice().reverse().map(t => [t.at, `${t.kind} L${t.level} ${t.size} @ ${t.price}`]));
    msg.textContent = '';
  } catch (e) {
    msg.textContent = e.message;
    msg.className = 'err';
  }
}

refresh();
setInterval(refresh, 5000);
</script>
</body>
</html>
"#;

/// GET /
pub async fn dashboard() -> Html<&'static str> {
    Html(PAGE)
}
