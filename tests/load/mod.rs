mod sustained_rate;
